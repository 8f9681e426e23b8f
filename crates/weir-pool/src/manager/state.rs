//! Pool lifecycle state snapshots

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::pool::PoolEngine;

/// Immutable snapshot of the manager's lifecycle state.
///
/// Snapshots are shared as `Arc<PoolState>` and replaced wholesale, so
/// the fields of one snapshot are always observed together.
pub enum PoolState {
    /// Constructed but not yet initialized. Left on the first
    /// successful initialization and never re-entered.
    Zero,
    /// Serving at the configured maximum.
    Normal {
        engine: Arc<PoolEngine>,
    },
    /// Temporarily serving above the configured maximum after a
    /// checkout timeout.
    Elevated {
        engine: Arc<PoolEngine>,
        since: Instant,
    },
    /// Terminal. Carries the context captured when the pool closed.
    Closed {
        trace: Arc<str>,
    },
}

impl PoolState {
    /// The engine, if this state carries one.
    pub fn engine(&self) -> Option<&Arc<PoolEngine>> {
        match self {
            PoolState::Normal { engine } | PoolState::Elevated { engine, .. } => Some(engine),
            PoolState::Zero | PoolState::Closed { .. } => None,
        }
    }

    /// Name of this state, for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            PoolState::Zero => "zero",
            PoolState::Normal { .. } => "normal",
            PoolState::Elevated { .. } => "elevated",
            PoolState::Closed { .. } => "closed",
        }
    }
}

impl fmt::Debug for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolState::Elevated { since, .. } => f
                .debug_struct("Elevated")
                .field("since", since)
                .finish_non_exhaustive(),
            other => write!(f, "{}", other.name()),
        }
    }
}
