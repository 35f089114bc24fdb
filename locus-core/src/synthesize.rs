// Natural language → SQL via the text-generation backend.
//
// The synthesizer only normalizes the reply; deciding whether the SQL is
// safe to run belongs to the executor.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::PipelineError;
use crate::execute::guard::MUTATING_KEYWORDS;
use crate::llm::LlmProvider;
use crate::schema::SchemaDescription;

/// Build the generation prompt for one question.
pub fn build_prompt(question: &str, schema: &SchemaDescription) -> String {
    format!(
        "Here are the details of a SQL table and an explanation of its columns.\n\n\
         Table name:\n{entity}\n\n\
         Columns name and explanation:\n{fields}\n\n\
         As a professional SQL developer, write one SQLite SELECT query that answers the \
         user's question. No table other than {entity} exists.\n\n\
         Question: {question}\n\n\
         Return the SQL statement only, in plain text, without explanations or markdown \
         code fences.",
        entity = schema.entity,
        fields = schema.render_fields(),
    )
}

/// Strip code-fence markup, surrounding prose, and whitespace from a
/// generated reply.
///
/// When the reply holds a fenced block, its first block body wins. Otherwise
/// stray fence markers and a leading `sql` tag are removed. Either way the
/// text is then cut down to the SQL: it starts at the first line opening a
/// `SELECT` or `WITH` statement and ends where prose follows the statement.
/// Text that still reads as SQL after a `;` is kept so the guard sees it.
pub fn normalize_query(reply: &str) -> String {
    let cleaned = match first_fenced_block(reply) {
        Some(body) => body.trim().to_string(),
        None => {
            let unfenced = reply.replace("```", "");
            strip_language_tag(unfenced.trim()).trim().to_string()
        }
    };
    trim_to_statement(&cleaned).trim().to_string()
}

fn first_fenced_block(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    let after_open = &reply[open + 3..];
    let close = after_open.find("```")?;
    let block = &after_open[..close];
    let body = match block.split_once('\n') {
        Some((info, rest)) if is_info_string(info) => rest,
        _ => strip_language_tag(block),
    };
    Some(body)
}

/// An opening fence line that names a language rather than starting the query.
fn is_info_string(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || ["sql", "sqlite"].iter().any(|tag| line.eq_ignore_ascii_case(tag))
}

fn strip_language_tag(text: &str) -> &str {
    for tag in ["sqlite", "sql"] {
        if let Some(prefix) = text.get(..tag.len()).filter(|p| p.eq_ignore_ascii_case(tag)) {
            let rest = &text[prefix.len()..];
            if rest.starts_with(char::is_whitespace) {
                return rest;
            }
        }
    }
    text
}

/// Clause words that continue a statement across a blank line or `;`.
const CONTINUATION_WORDS: &[&str] = &[
    "SELECT", "WITH", "FROM", "WHERE", "AND", "OR", "ORDER", "GROUP", "HAVING", "LIMIT",
    "OFFSET", "JOIN", "LEFT", "INNER", "CROSS", "UNION", "EXCEPT", "INTERSECT",
];

fn trim_to_statement(text: &str) -> &str {
    let Some(start) = statement_start(text) else {
        return text;
    };
    let sql = &text[start..];
    for end in statement_boundaries(sql) {
        let rest = sql[end..].trim_start();
        if rest.is_empty() || !reads_as_sql(rest) {
            return &sql[..end];
        }
    }
    sql
}

/// Byte offset of the first line that opens a `SELECT` or `WITH` statement.
fn statement_start(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let body = line.trim_start();
        if opens_statement(body) {
            return Some(offset + line.len() - body.len());
        }
        offset += line.len();
    }
    None
}

fn opens_statement(line: &str) -> bool {
    match first_word(line) {
        Some(w) if w.eq_ignore_ascii_case("SELECT") => true,
        Some(w) if w.eq_ignore_ascii_case("WITH") => {
            // `WITH RECURSIVE ...`, `WITH name(cols) AS ...`, `WITH name AS ...`
            let mut words = line.split_whitespace().skip(1);
            match (words.next(), words.next()) {
                (Some(second), _) if second.eq_ignore_ascii_case("RECURSIVE") => true,
                (Some(second), _) if second.contains('(') => true,
                (_, Some(third)) => third.eq_ignore_ascii_case("AS"),
                _ => false,
            }
        }
        _ => false,
    }
}

/// Candidate statement ends outside quotes: just past each `;`, and at each
/// blank line.
fn statement_boundaries(sql: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ';') => ends.push(i + 1),
            (None, '\n')
                if sql[i + 1..]
                    .trim_start_matches([' ', '\t', '\r'])
                    .starts_with('\n') =>
            {
                ends.push(i);
            }
            _ => {}
        }
    }
    ends
}

fn reads_as_sql(text: &str) -> bool {
    match first_word(text) {
        None => true,
        Some(w) => CONTINUATION_WORDS
            .iter()
            .chain(MUTATING_KEYWORDS)
            .any(|k| w.eq_ignore_ascii_case(k)),
    }
}

fn first_word(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    (end > 0).then(|| &text[..end])
}

/// Turns record questions into SQL using a fixed schema description.
#[derive(Debug, Clone)]
pub struct QuerySynthesizer {
    provider: Arc<dyn LlmProvider>,
    schema: Arc<SchemaDescription>,
    temperature: f64,
}

impl QuerySynthesizer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        schema: Arc<SchemaDescription>,
        temperature: f64,
    ) -> Self {
        Self {
            provider,
            schema,
            temperature,
        }
    }

    pub fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    /// One backend call; the normalized reply must be non-empty.
    #[instrument(skip_all, name = "synthesize")]
    pub async fn synthesize(&self, question: &str) -> Result<String, PipelineError> {
        let prompt = build_prompt(question, &self.schema);
        let (reply, usage) = self
            .provider
            .call(&prompt, self.temperature)
            .await
            .map_err(|e| PipelineError::SynthesisFailed(e.to_string()))?;
        debug!(
            model = self.provider.model_id(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Synthesis reply received"
        );

        let query = normalize_query(&reply);
        if query.is_empty() {
            return Err(PipelineError::SynthesisFailed(
                "backend returned no query text".into(),
            ));
        }
        debug!(%query, "Synthesized query");
        Ok(query)
    }
}
