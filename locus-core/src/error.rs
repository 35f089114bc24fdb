/// Top-level Locus error type.
///
/// All fallible operations in `locus-core` return [`Result<T, LocusError>`](Result).
/// Each variant wraps a layer-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum LocusError {
    /// Error from the record store layer (`SQLite` operations, imports).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error communicating with a text-generation provider.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Error communicating with an intent scoring backend.
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A question-handling stage failed.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Errors from the SQLite-backed record store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file does not exist at the configured path.
    #[error("Database not found: {0}")]
    NotFound(String),

    /// A blocking store task panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Task(String),

    /// JSON import/export of records failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem I/O error while reading an import file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from text-generation provider interactions.
#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    /// Network-level failure connecting to the provider.
    #[error("Network error: {0}")]
    Network(String),

    /// Provider API returned a non-success HTTP status.
    #[error("API error (HTTP {status}): {body}")]
    ApiError {
        /// HTTP status code from the provider.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Provider response could not be parsed into the expected format.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// Provider configuration is missing or invalid (API key, model, etc.).
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors from intent scoring backends.
#[derive(thiserror::Error, Debug)]
pub enum ScoringError {
    /// Network-level failure connecting to the scoring endpoint.
    #[error("Network error: {0}")]
    Network(String),

    /// Scoring API returned a non-success HTTP status.
    #[error("API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Scoring response was malformed (mismatched labels/scores, bad JSON).
    #[error("Response parse error: {0}")]
    Parse(String),

    /// Scoring backend configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors in Locus configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Config file not readable: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Failures of a single question-handling run.
///
/// The orchestrator converts every one of these into a user-visible
/// degraded response; none of them reach the caller as an `Err`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The question was empty or whitespace.
    #[error("Empty question")]
    EmptyQuestion,

    /// The scoring backend could not classify the question.
    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// The generation backend failed while producing a conversational reply.
    #[error("Conversation failed: {0}")]
    ConversationFailed(String),

    /// The generation backend failed or returned nothing usable for a query.
    #[error("Query synthesis failed: {0}")]
    SynthesisFailed(String),

    /// The store rejected or failed to run the synthesized query.
    #[error("Query execution failed: {diagnostic}")]
    ExecutionError { diagnostic: String },

    /// A backend call exceeded its per-call deadline.
    #[error("Backend timed out during {stage}")]
    BackendTimeout { stage: String },

    /// The synthesized query could mutate the store and was not run.
    #[error("Unsafe query rejected: {reason}")]
    UnsafeQueryRejected { reason: String },
}

impl PipelineError {
    /// Stable machine-readable identifier for this failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyQuestion => "empty_question",
            Self::ClassificationUnavailable(_) => "classification_unavailable",
            Self::ConversationFailed(_) => "conversation_failed",
            Self::SynthesisFailed(_) => "synthesis_failed",
            Self::ExecutionError { .. } => "execution_error",
            Self::BackendTimeout { .. } => "backend_timeout",
            Self::UnsafeQueryRejected { .. } => "unsafe_query_rejected",
        }
    }

    /// Short explanation suitable for showing to the person who asked.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyQuestion => "Please type a question.".to_string(),
            Self::ClassificationUnavailable(_) => {
                "The assistant is temporarily unavailable. Please try again shortly.".to_string()
            }
            Self::ConversationFailed(_) => {
                "Sorry, I couldn't come up with a reply right now.".to_string()
            }
            Self::SynthesisFailed(_) => {
                "Sorry, I couldn't turn that into a lookup of our outlets.".to_string()
            }
            Self::ExecutionError { diagnostic } => {
                format!("Sorry, the outlet lookup failed: {diagnostic}")
            }
            Self::BackendTimeout { stage } => {
                format!("The request took too long ({stage}). Please try again.")
            }
            Self::UnsafeQueryRejected { .. } => {
                "That request would change outlet data, which is not allowed. No changes were made."
                    .to_string()
            }
        }
    }
}

/// Convenience alias for `Result<T, LocusError>`.
pub type Result<T> = std::result::Result<T, LocusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_kinds_are_distinct() {
        let all = [
            PipelineError::EmptyQuestion,
            PipelineError::ClassificationUnavailable("down".into()),
            PipelineError::ConversationFailed("down".into()),
            PipelineError::SynthesisFailed("empty".into()),
            PipelineError::ExecutionError {
                diagnostic: "no such column".into(),
            },
            PipelineError::BackendTimeout {
                stage: "classify".into(),
            },
            PipelineError::UnsafeQueryRejected {
                reason: "DELETE".into(),
            },
        ];
        let kinds: std::collections::HashSet<_> = all.iter().map(PipelineError::kind).collect();
        assert_eq!(kinds.len(), all.len());
    }

    #[test]
    fn execution_message_carries_diagnostic() {
        let err = PipelineError::ExecutionError {
            diagnostic: "no such column: foo".into(),
        };
        assert!(err.user_message().contains("no such column: foo"));
    }

    #[test]
    fn unsafe_message_does_not_look_like_empty_result() {
        let msg = PipelineError::UnsafeQueryRejected {
            reason: "DROP".into(),
        }
        .user_message();
        assert!(msg.contains("not allowed"));
        assert!(!msg.to_lowercase().contains("no outlet"));
    }
}
