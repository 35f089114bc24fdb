// Response shaping: one user-facing answer per question.
//
// Record results follow the unwrap rule: one row is returned on its own
// (a bare value when it has a single column), several rows stay a list, and
// no rows become an explicit `NoMatch` rather than an empty list.

use serde::{Deserialize, Serialize};

use crate::classify::Intent;
use crate::error::PipelineError;
use crate::store::{CellValue, Row};

/// Pipeline stages a run passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Classifying,
    ConversingPath,
    QueryingPath,
    Shaping,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Raw output of whichever path handled the question.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    Reply(String),
    Rows(Vec<Row>),
}

/// The single payload returned for a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Answer {
    /// Conversational reply from the generation backend, unchanged.
    Reply(String),
    /// Exactly one row with exactly one column.
    Value(CellValue),
    /// Exactly one row with several columns.
    Row(Row),
    /// Two or more rows, in query order.
    Rows(Vec<Row>),
    /// The query ran and matched nothing.
    NoMatch,
    /// The run failed; `kind` is a stable identifier.
    Failure { kind: String, message: String },
}

impl Answer {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Plain-text rendering for terminals and chat bubbles.
    pub fn to_text(&self) -> String {
        match self {
            Self::Reply(text) => text.clone(),
            Self::Value(v) => v.to_string(),
            Self::Row(row) => render_row(row),
            Self::Rows(rows) => rows
                .iter()
                .map(Vec::as_slice)
                .map(render_row)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::NoMatch => "No matching outlets found.".to_string(),
            Self::Failure { message, .. } => message.clone(),
        }
    }
}

fn render_row(row: &[CellValue]) -> String {
    row.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Final result of handling one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub question: String,
    pub intent: Option<Intent>,
    pub answer: Answer,
    /// Stages visited, ending in `Done` or `Failed`.
    pub stages: Vec<Stage>,
}

impl Response {
    pub fn terminal_stage(&self) -> Option<Stage> {
        self.stages.last().copied()
    }
}

/// Turn a path's raw output into an answer.
pub fn shape(intent: Intent, raw: RawResult) -> Answer {
    match (intent, raw) {
        (_, RawResult::Reply(text)) => Answer::Reply(text),
        (_, RawResult::Rows(mut rows)) => match rows.len() {
            0 => Answer::NoMatch,
            1 => {
                let mut row = rows.remove(0);
                if row.len() == 1 {
                    Answer::Value(row.remove(0))
                } else {
                    Answer::Row(row)
                }
            }
            _ => Answer::Rows(rows),
        },
    }
}

/// The answer for a failed run.
pub fn failure(err: &PipelineError) -> Answer {
    Answer::Failure {
        kind: err.kind().to_string(),
        message: err.user_message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn chat_reply_passes_through() {
        assert_eq!(
            shape(Intent::ConversationalChat, RawResult::Reply("  Hi there! ".into())),
            Answer::Reply("  Hi there! ".into())
        );
    }

    #[test]
    fn single_cell_unwraps_to_value() {
        let answer = shape(
            Intent::RecordQuestion,
            RawResult::Rows(vec![vec![text("Jalan 1")]]),
        );
        assert_eq!(answer, Answer::Value(text("Jalan 1")));
    }

    #[test]
    fn single_row_unwraps_to_row() {
        let row = vec![text("Subway A"), text("Jalan 1")];
        let answer = shape(Intent::RecordQuestion, RawResult::Rows(vec![row.clone()]));
        assert_eq!(answer, Answer::Row(row));
    }

    #[test]
    fn many_rows_stay_ordered() {
        let rows = vec![vec![text("b")], vec![text("a")], vec![text("c")]];
        assert_eq!(
            shape(Intent::RecordQuestion, RawResult::Rows(rows.clone())),
            Answer::Rows(rows)
        );
    }

    #[test]
    fn empty_is_no_match_not_empty_list() {
        let empty = shape(Intent::RecordQuestion, RawResult::Rows(Vec::new()));
        assert_eq!(empty, Answer::NoMatch);
        assert_ne!(empty, Answer::Rows(Vec::new()));
        let single = shape(Intent::RecordQuestion, RawResult::Rows(vec![vec![CellValue::Null]]));
        assert_ne!(empty, single);
    }

    #[test]
    fn failure_keeps_kind() {
        let answer = failure(&PipelineError::UnsafeQueryRejected {
            reason: "DELETE statement".into(),
        });
        assert!(answer.is_failure());
        assert_ne!(answer, Answer::NoMatch);
        match answer {
            Answer::Failure { kind, .. } => assert_eq!(kind, "unsafe_query_rejected"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn answers_serialize_with_kind_tag() {
        let json = serde_json::to_value(Answer::Value(text("x"))).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "value", "value": "x"}));
        let json = serde_json::to_value(Answer::NoMatch).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "no_match"}));
    }

    #[test]
    fn text_rendering() {
        let rows = Answer::Rows(vec![
            vec![text("A"), CellValue::Real(3.5)],
            vec![text("B"), CellValue::Null],
        ]);
        assert_eq!(rows.to_text(), "A | 3.5\nB | NULL");
        assert_eq!(Answer::NoMatch.to_text(), "No matching outlets found.");
    }
}
