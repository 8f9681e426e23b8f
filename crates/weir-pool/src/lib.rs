//! weir-pool - Adaptive database connection pooling
//!
//! This crate brokers access to a bounded pool of live database
//! connections for a multi-threaded client: lazy initialization,
//! checkout validation, leak detection, and a bounded overdrive
//! expansion that is automatically rescinded after a cooldown.

pub mod interceptor;
pub mod manager;
pub mod pool;
mod validate;

pub use interceptor::{InterceptorSource, OnAcquireHook};
pub use manager::{BackoffStrategy, ConnectionManager, PoolState, COOLDOWN, SLOW_ACQUIRE_WARN};
pub use pool::{PoolEngine, PoolStats, PooledConnection, ReapSummary};
pub use validate::validate_connection;
