//! Connection trait for pooled physical connections

use async_trait::async_trait;

use crate::Result;

/// A live physical database connection.
///
/// Implementations are produced by a [`DriverAdapter`](crate::DriverAdapter)
/// and owned by the pool until checked out. A checked-out connection is
/// exclusively owned by its holder until it is returned.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgres", "oracle", "h2")
    fn driver_name(&self) -> &str;

    /// Execute a query and return the number of rows it produced.
    async fn query(&self, sql: &str) -> Result<u64>;

    /// Close the connection, releasing the underlying network resources.
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
