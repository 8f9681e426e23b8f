//! Adaptive connection manager implementation

use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use weir_core::{apply_connection_security, DriverAdapter, PoolConfig, Result, WeirError};

use super::backoff::BackoffStrategy;
use super::state::PoolState;
use crate::interceptor::{InterceptorSource, OnAcquireHook};
use crate::pool::{PoolEngine, PoolStats, PooledConnection};

/// Quiet period after which an elevated pool is demoted to nominal
/// size.
pub const COOLDOWN: Duration = Duration::from_millis(30_000);

/// Acquisitions slower than this are logged at warn with pool stats.
pub const SLOW_ACQUIRE_WARN: Duration = Duration::from_millis(1_000);

/// Tracks failed-initialization backoff; guarded by the lifecycle lock.
struct InitBackoff {
    attempts: u32,
    not_before: Option<Instant>,
    strategy: BackoffStrategy,
}

impl InitBackoff {
    fn new(strategy: BackoffStrategy) -> Self {
        Self {
            attempts: 0,
            not_before: None,
            strategy,
        }
    }

    fn arm(&mut self) {
        let delay = self.strategy.calculate_delay(self.attempts);
        self.attempts += 1;
        self.not_before = Some(Instant::now() + delay);
        tracing::warn!(
            attempt = self.attempts,
            retry_in = ?delay,
            "pool initialization failed, backing off"
        );
    }

    fn reset(&mut self) {
        self.attempts = 0;
        self.not_before = None;
    }
}

/// Brokers access to a pool of database connections, adapting the pool
/// size to checkout pressure.
///
/// The manager is cheap to construct; the first `acquire` (or an
/// explicit [`ConnectionManager::init`]) starts the pool. A checkout
/// timeout at nominal size elevates `max_connections` by the configured
/// overdrive and retries once; the elevation is rescinded after
/// [`COOLDOWN`] of quiet. [`ConnectionManager::close`] is terminal.
pub struct ConnectionManager {
    config: PoolConfig,
    adapter: Arc<dyn DriverAdapter>,
    on_acquire: Option<OnAcquireHook>,
    state: RwLock<Arc<PoolState>>,
    lifecycle: AsyncMutex<InitBackoff>,
    cooldown: Duration,
}

impl ConnectionManager {
    /// Create a manager for `config`, materializing connections through
    /// `adapter`. No I/O happens until the first use.
    pub fn new(config: PoolConfig, adapter: Arc<dyn DriverAdapter>) -> Self {
        Self {
            config,
            adapter,
            on_acquire: None,
            state: RwLock::new(Arc::new(PoolState::Zero)),
            lifecycle: AsyncMutex::new(InitBackoff::new(BackoffStrategy::default())),
            cooldown: COOLDOWN,
        }
    }

    /// Register a hook invoked once on every successful checkout before
    /// the connection is returned to the caller.
    pub fn with_on_acquire(mut self, hook: OnAcquireHook) -> Self {
        self.on_acquire = Some(hook);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_init_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.lifecycle = AsyncMutex::new(InitBackoff::new(strategy));
        self
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Name of the current lifecycle state, for logs and metrics.
    pub fn state_name(&self) -> &'static str {
        self.snapshot().name()
    }

    /// Live pool statistics, if the pool is running.
    pub fn stats(&self) -> Option<PoolStats> {
        self.snapshot().engine().map(|engine| engine.stats())
    }

    /// The engine's current admission threshold, if the pool is
    /// running.
    pub fn current_max_size(&self) -> Option<usize> {
        self.snapshot().engine().map(|engine| engine.max_size())
    }

    fn snapshot(&self) -> Arc<PoolState> {
        Arc::clone(&self.state.read())
    }

    /// Replace the snapshot iff it is still `expected`. Pointer
    /// comparison only; the write lock is held for the swap alone.
    fn swap_state(&self, expected: &Arc<PoolState>, next: PoolState) -> bool {
        let mut state = self.state.write();
        if Arc::ptr_eq(&state, expected) {
            *state = Arc::new(next);
            true
        } else {
            false
        }
    }

    /// Check out a connection, initializing the pool on first use.
    ///
    /// Blocks up to the configured checkout timeout. A timeout at
    /// nominal size elevates the pool and retries once; a second
    /// timeout is returned to the caller.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let start = Instant::now();
        let result = self.acquire_inner().await;
        let waited = start.elapsed();
        if waited > SLOW_ACQUIRE_WARN {
            tracing::warn!(?waited, stats = ?self.stats(), "slow connection checkout");
        } else {
            tracing::debug!(?waited, "connection checkout");
        }
        result
    }

    async fn acquire_inner(&self) -> Result<PooledConnection> {
        let timeout = self.config.checkout_timeout();
        loop {
            let snap = self.snapshot();
            match &*snap {
                PoolState::Zero => {
                    self.ensure_started().await?;
                }

                PoolState::Normal { engine } => {
                    match engine.acquire(timeout).await {
                        Ok(conn) => return Ok(conn),
                        Err(WeirError::Timeout(reason)) => {
                            // A timeout at nominal size usually means the
                            // holders are deadlocked waiting on a second
                            // connection each. Turn it up to eleven.
                            tracing::error!(
                                reason = %reason,
                                "timed out getting connection from pool"
                            );
                            let elevated = self.config.max_connections + self.config.overdrive;
                            let next = PoolState::Elevated {
                                engine: Arc::clone(engine),
                                since: Instant::now(),
                            };
                            if self.swap_state(&snap, next) {
                                tracing::info!(
                                    from = self.config.max_connections,
                                    to = elevated,
                                    "elevating connection pool"
                                );
                                engine.set_max_size(elevated);
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }

                PoolState::Elevated { engine, since } => {
                    if since.elapsed() >= self.cooldown {
                        let next = PoolState::Normal {
                            engine: Arc::clone(engine),
                        };
                        if self.swap_state(&snap, next) {
                            tracing::info!(
                                to = self.config.max_connections,
                                "de-elevating connection pool"
                            );
                            engine.set_max_size(self.config.max_connections);
                        }
                    } else {
                        return engine.acquire(timeout).await;
                    }
                }

                PoolState::Closed { trace } => {
                    return Err(WeirError::Closed {
                        trace: Arc::clone(trace),
                    });
                }
            }
        }
    }

    /// Initialize the pool eagerly.
    ///
    /// Idempotent once running; fails with the closing context if the
    /// manager is closed. A failed initialization leaves the manager
    /// uninitialized and arms an exponential backoff before the next
    /// attempt.
    #[tracing::instrument(skip(self), fields(pool = %self.config.pool_name()))]
    pub async fn init(&self) -> Result<()> {
        match &*self.snapshot() {
            PoolState::Normal { .. } | PoolState::Elevated { .. } => Ok(()),
            PoolState::Closed { trace } => Err(WeirError::Closed {
                trace: Arc::clone(trace),
            }),
            PoolState::Zero => self.ensure_started().await,
        }
    }

    async fn ensure_started(&self) -> Result<()> {
        let mut backoff = self.lifecycle.lock().await;

        // Re-check under the lifecycle lock: another caller may have
        // initialized or closed the pool while we waited for it.
        match &*self.snapshot() {
            PoolState::Normal { .. } | PoolState::Elevated { .. } => return Ok(()),
            PoolState::Closed { trace } => {
                return Err(WeirError::Closed {
                    trace: Arc::clone(trace),
                })
            }
            PoolState::Zero => {}
        }

        if let Some(not_before) = backoff.not_before {
            let now = Instant::now();
            if now < not_before {
                return Err(WeirError::Init(format!(
                    "initialization backed off for another {:?} after {} failed attempt(s)",
                    not_before - now,
                    backoff.attempts
                )));
            }
        }

        match self.start_engine().await {
            Ok(engine) => {
                backoff.reset();
                // Only lifecycle holders move the state out of Zero, so a
                // plain store cannot lose a concurrent transition here.
                *self.state.write() = Arc::new(PoolState::Normal { engine });
                Ok(())
            }
            Err(e) => {
                backoff.arm();
                Err(e)
            }
        }
    }

    async fn start_engine(&self) -> Result<Arc<PoolEngine>> {
        self.config.validate()?;
        tracing::info!(config = ?self.config, "initializing connection pool");

        let mut props = self.config.driver_properties();
        let config = apply_connection_security(self.config.clone(), &mut props)?;
        props.log_redacted();

        let source = InterceptorSource::new(
            Arc::clone(&self.adapter),
            config.effective_url(),
            config.driver_class.clone(),
            props,
            self.on_acquire.clone(),
        );
        tracing::info!(pool = %config.pool_name(), url = %source.url(), "database url resolved");

        let engine = PoolEngine::start(&config, source).await?;

        // Test-acquire: one connection out and straight back in.
        match engine.acquire(config.checkout_timeout()).await {
            Ok(conn) => drop(conn),
            Err(e) => {
                tracing::error!(
                    pool = %config.pool_name(),
                    url = %config.url,
                    error = %e,
                    "failed to check out a connection from the freshly started pool; \
                     check the url, the password, and that the server key matches"
                );
                let _ = engine
                    .close(Arc::from("pool closed after a failed init test-acquire"))
                    .await;
                return Err(WeirError::Init(e.to_string()));
            }
        }

        Ok(engine)
    }

    /// Close the pool.
    ///
    /// Serialized against `init` and itself; idempotent. In-flight and
    /// subsequent acquires observe [`WeirError::Closed`] carrying the
    /// context captured here.
    #[tracing::instrument(skip(self), fields(pool = %self.config.pool_name()))]
    pub async fn close(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let snap = self.snapshot();
        let trace: Arc<str> = Arc::from(format!("pool closed here:\n{}", Backtrace::force_capture()));
        let result = match &*snap {
            PoolState::Normal { engine } | PoolState::Elevated { engine, .. } => {
                tracing::debug!(pool = %self.config.pool_name(), "closing connection pool");
                engine.close(Arc::clone(&trace)).await
            }
            PoolState::Closed { .. } => return Ok(()),
            PoolState::Zero => Ok(()),
        };

        *self.state.write() = Arc::new(PoolState::Closed { trace });
        result
    }
}
