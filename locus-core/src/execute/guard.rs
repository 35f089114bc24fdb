// Read-only guard for generated SQL.
//
// Parsed statements must be a single query whose body is SELECT-only.
// Text the parser cannot handle falls back to a keyword scan that ignores
// quoted literals, so prose or odd dialect still cannot smuggle in a write.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use crate::error::PipelineError;

/// Keywords that start or enable a write, schema change, or attach.
pub(crate) const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "REPLACE", "TRUNCATE", "ATTACH",
    "DETACH", "PRAGMA", "VACUUM", "REINDEX", "GRANT", "REVOKE", "MERGE", "UPSERT",
];

/// Outcome of inspecting a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Parsed as a single read-only query.
    ReadOnly,
    /// Not parseable, but no mutating keyword appears outside literals.
    Unparsed,
    /// Must not run; carries the reason.
    Mutating(String),
}

pub fn inspect(sql: &str) -> Verdict {
    match Parser::parse_sql(&SQLiteDialect {}, sql) {
        Ok(statements) => inspect_statements(&statements),
        Err(_) => match find_mutating_keyword(sql) {
            Some(kw) => Verdict::Mutating(format!("contains {kw}")),
            None => Verdict::Unparsed,
        },
    }
}

pub fn is_mutating(sql: &str) -> bool {
    matches!(inspect(sql), Verdict::Mutating(_))
}

/// `Ok` when the query may be handed to the store.
pub fn check_read_only(sql: &str) -> Result<(), PipelineError> {
    match inspect(sql) {
        Verdict::ReadOnly | Verdict::Unparsed => Ok(()),
        Verdict::Mutating(reason) => Err(PipelineError::UnsafeQueryRejected { reason }),
    }
}

fn inspect_statements(statements: &[Statement]) -> Verdict {
    match statements {
        [] => Verdict::Unparsed,
        [Statement::Query(query)] => match check_query(query) {
            Ok(()) => Verdict::ReadOnly,
            Err(reason) => Verdict::Mutating(reason),
        },
        [other] => Verdict::Mutating(format!("{} statement", statement_label(other))),
        _ => Verdict::Mutating(format!("{} statements in one query", statements.len())),
    }
}

fn check_query(query: &Query) -> Result<(), String> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(expr: &SetExpr) -> Result<(), String> {
    match expr {
        SetExpr::Select(select) => {
            if select.into.is_some() {
                Err("SELECT INTO creates a table".to_string())
            } else {
                Ok(())
            }
        }
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) => Ok(()),
        _ => Err("data-modifying query body".to_string()),
    }
}

/// First word of the statement's SQL text, e.g. `DELETE` or `DROP`.
fn statement_label(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("non-query")
        .to_uppercase()
}

/// Scan bare words outside quotes and comments for a mutating keyword.
pub fn find_mutating_keyword(sql: &str) -> Option<&'static str> {
    let mut chars = sql.chars().peekable();
    let mut word = String::new();

    let flush = |word: &mut String| -> Option<&'static str> {
        let hit = MUTATING_KEYWORDS
            .iter()
            .find(|kw| word.eq_ignore_ascii_case(kw))
            .copied();
        word.clear();
        hit
    };

    while let Some(c) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        if let Some(hit) = flush(&mut word) {
            return Some(hit);
        }
        match c {
            '\'' | '"' | '`' => {
                // A doubled quote closes and reopens the literal, so escapes need no case.
                for q in chars.by_ref() {
                    if q == c {
                        break;
                    }
                }
            }
            '[' => {
                for q in chars.by_ref() {
                    if q == ']' {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for q in chars.by_ref() {
                    if q == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for q in chars.by_ref() {
                    if prev == '*' && q == '/' {
                        break;
                    }
                    prev = q;
                }
            }
            _ => {}
        }
    }
    flush(&mut word)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn plain_select_is_read_only() {
        assert_eq!(
            inspect("SELECT address FROM subway WHERE outlet_name = 'Outlet X';"),
            Verdict::ReadOnly
        );
        assert_eq!(
            inspect("WITH late AS (SELECT * FROM subway) SELECT outlet_name FROM late"),
            Verdict::ReadOnly
        );
        assert_eq!(
            inspect("SELECT outlet_name FROM subway UNION SELECT address FROM subway"),
            Verdict::ReadOnly
        );
    }

    #[test]
    fn keywords_inside_literals_are_fine() {
        assert_eq!(
            inspect("SELECT * FROM subway WHERE outlet_name LIKE '%Update%'"),
            Verdict::ReadOnly
        );
        assert_eq!(find_mutating_keyword("SELECT 'drop table' -- delete\n"), None);
        assert_eq!(find_mutating_keyword("SELECT [delete] /* insert */ FROM t"), None);
    }

    #[test]
    fn writes_and_schema_changes_are_rejected() {
        for sql in [
            "DELETE FROM subway",
            "DROP TABLE subway",
            "UPDATE subway SET address = ''",
            "INSERT INTO subway (outlet_name) VALUES ('x')",
            "CREATE TABLE evil (id INTEGER)",
            "ALTER TABLE subway ADD COLUMN x TEXT",
        ] {
            assert!(is_mutating(sql), "{sql} should be rejected");
        }
    }

    #[test]
    fn stacked_statements_are_rejected() {
        assert!(is_mutating("SELECT * FROM subway; DELETE FROM subway"));
        assert!(is_mutating("SELECT 1; SELECT 2"));
    }

    #[test]
    fn unparseable_text_falls_back_to_keywords() {
        assert!(is_mutating("PRAGMA writable_schema = 1"));
        assert!(is_mutating("please delete every outlet"));
        assert!(is_mutating("ATTACH DATABASE 'x.db' AS x"));
        assert_eq!(inspect("Sorry, I cannot help with that."), Verdict::Unparsed);
    }

    #[test]
    fn check_maps_to_unsafe_error() {
        let err = check_read_only("DROP TABLE subway").unwrap_err();
        assert!(matches!(err, PipelineError::UnsafeQueryRejected { .. }));
        assert!(check_read_only("SELECT 1").is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn any_text_with_a_delete_statement_is_mutating(
            prefix in "[A-Za-z ]{0,20}",
            target in "[a-z_]{1,10}",
        ) {
            let sql = format!("{prefix}; DELETE FROM {target}");
            prop_assert!(is_mutating(&sql));
            let sql = format!("DELETE FROM {target} WHERE 1 = 1");
            prop_assert!(is_mutating(&sql));
        }

        #[test]
        fn selects_over_known_columns_pass(
            col in prop_oneof![
                Just("outlet_name"), Just("address"), Just("opening_hours"),
                Just("waze_link"), Just("gmaps_link"),
            ],
            name in "[A-Za-z ]{0,15}",
        ) {
            let sql = format!("SELECT {col} FROM subway WHERE outlet_name = '{name}'");
            prop_assert_eq!(inspect(&sql), Verdict::ReadOnly);
        }
    }
}
