//! Pool engine: owns the live connections and admission control
//!
//! This module provides the bounded connection pool underneath the
//! adaptive manager: FIFO admission, checkout validation, age and idle
//! eviction, leak detection, and runtime-adjustable sizing.
//!
//! # Example
//!
//! ```ignore
//! use weir_pool::pool::PoolEngine;
//!
//! let engine = PoolEngine::start(&config, source).await?;
//! let conn = engine.acquire(config.checkout_timeout()).await?;
//! // Use connection...
//! // Connection returned to pool on drop
//! ```

mod engine;
mod stats;


pub use engine::{PoolEngine, PooledConnection, ReapSummary};
pub use stats::PoolStats;
