//! Checkout validation
//!
//! Runs the engine-specific test query against a connection before it
//! is handed out, bounded by the caller's remaining checkout budget.

use std::time::{Duration, Instant};

use weir_core::{Connection, Result, WeirError};

/// Validate a connection by running `test_query` within `budget`.
///
/// Returns the query round-trip time on success. A connection that
/// fails validation must be discarded by the caller, never re-queued.
pub async fn validate_connection(
    conn: &dyn Connection,
    test_query: &str,
    budget: Duration,
) -> Result<Duration> {
    if conn.is_closed() {
        return Err(WeirError::Validation("connection is closed".to_string()));
    }

    let start = Instant::now();
    match tokio::time::timeout(budget, conn.query(test_query)).await {
        Ok(Ok(rows)) if rows > 0 => Ok(start.elapsed()),
        Ok(Ok(_)) => Err(WeirError::Validation(format!(
            "test query `{test_query}` returned no rows"
        ))),
        Ok(Err(e)) => Err(WeirError::Validation(format!(
            "test query `{test_query}` failed: {e}"
        ))),
        Err(_) => Err(WeirError::Validation(format!(
            "test query `{test_query}` timed out after {budget:?}"
        ))),
    }
}
