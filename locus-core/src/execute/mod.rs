//! Safe execution of synthesized SQL against the record store.

pub mod guard;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::error::{LocusError, PipelineError, StoreError};
use crate::store::{RecordStore, Row};

/// Runs untrusted generated SQL: guard first, then a bounded store call.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    #[instrument(skip_all, name = "execute")]
    pub async fn execute(&self, query: &str) -> Result<Vec<Row>, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::ExecutionError {
                diagnostic: "empty query".into(),
            });
        }

        if let Err(e) = guard::check_read_only(query) {
            warn!(%query, error = %e, "Refusing to run generated query");
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, self.store.query(query)).await {
            Err(_) => Err(PipelineError::BackendTimeout {
                stage: "store query".into(),
            }),
            Ok(Err(e)) => {
                debug!(error = %e, "Store rejected query");
                Err(PipelineError::ExecutionError {
                    diagnostic: diagnostic(&e),
                })
            }
            Ok(Ok(rows)) => Ok(rows),
        }
    }
}

/// The backend's own message, without our wrapper prefixes.
fn diagnostic(err: &LocusError) -> String {
    match err {
        LocusError::Store(StoreError::Sqlite(e)) => e.to_string(),
        other => other.to_string(),
    }
}
