use super::{Outlet, Row};

/// Read-only access to the outlet record store.
///
/// Implementations must never mutate stored data through these methods and
/// must release any connection they open before returning.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Run one read-only SQL statement and return its rows in order.
    async fn query(&self, sql: &str) -> crate::error::Result<Vec<Row>>;

    /// Every outlet record, in storage order.
    async fn list_outlets(&self) -> crate::error::Result<Vec<Outlet>>;
}
