//! Adaptive connection pool manager
//!
//! This module drives the pool through its lifecycle:
//! uninitialized → normal → elevated → normal → closed. The common
//! acquire path reads an immutable state snapshot and never holds a
//! lock across I/O; transitions replace the snapshot by
//! compare-and-swap and the protocol restarts from whatever state it
//! then observes.
//!
//! # Example
//!
//! ```ignore
//! use weir_pool::manager::ConnectionManager;
//!
//! let manager = ConnectionManager::new(config, adapter);
//! let conn = manager.acquire().await?;
//! // Use connection...
//! // Connection returned to pool on drop
//! ```

mod backoff;
mod manager;
mod state;


pub use backoff::BackoffStrategy;
pub use manager::{ConnectionManager, COOLDOWN, SLOW_ACQUIRE_WARN};
pub use state::PoolState;
