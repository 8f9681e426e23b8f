//! Error types for weir

use std::sync::Arc;

use thiserror::Error;

/// Core error type for weir operations
#[derive(Error, Debug)]
pub enum WeirError {
    /// Missing or invalid configuration; fatal to the manager instance.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The underlying driver failed to produce a connection.
    #[error("Driver error: {0}")]
    Driver(String),

    /// The on-acquire hook rejected a freshly checked-out connection.
    #[error("On-acquire hook failed: {0}")]
    Hook(String),

    /// The test query failed on a checked-out connection.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No connection became available within the checkout timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Pool initialization failed; the manager stays uninitialized and
    /// may be retried.
    #[error("Initialization error: {0}")]
    Init(String),

    /// The pool has been closed. Carries the context captured at the
    /// `close()` call that produced it.
    #[error("Connection pool already closed\n{trace}")]
    Closed { trace: Arc<str> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for weir operations
pub type Result<T> = std::result::Result<T, WeirError>;
