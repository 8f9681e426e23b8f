//! Connection pool engine implementation

use std::backtrace::Backtrace;
use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;
use weir_core::{Connection, PoolConfig, Result, WeirError};

use super::stats::PoolStats;
use crate::interceptor::InterceptorSource;
use crate::validate::validate_connection;

/// Delay between driver retries while an acquire still has budget left.
const CREATE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Interval between background reap sweeps.
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// An idle pooled connection with its lifecycle metadata.
struct IdleConn {
    conn: Arc<dyn Connection>,
    born_at: Instant,
    last_returned_at: Instant,
}

/// Book-keeping for a checked-out connection, kept for leak detection.
struct CheckoutRecord {
    checked_out_at: Instant,
    trace: Option<Arc<str>>,
    leak_reported: bool,
}

/// Counts of what a single [`PoolEngine::reap`] sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    /// Idle connections evicted for exceeding the idle timeout.
    pub evicted: usize,
    /// Checked-out connections newly reported as leaks.
    pub leaks: usize,
}

/// A bounded, multi-producer/multi-consumer pool of database
/// connections.
///
/// Admission is controlled by a fair semaphore, so waiting callers are
/// served strictly first-come-first-served. The admission threshold can
/// be adjusted at runtime with [`PoolEngine::set_max_size`]; shrinking
/// never closes connections early, it only bars new allocations until
/// enough checked-out connections have come back.
pub struct PoolEngine {
    name: String,
    source: InterceptorSource,
    test_query: &'static str,
    min_size: usize,
    max_size: AtomicUsize,
    /// Permits to burn as connections return after a shrink.
    permit_debt: AtomicUsize,
    /// Serializes max-size adjustments.
    resize_lock: Mutex<()>,
    max_connection_age: Duration,
    max_idle_time: Duration,
    unreturned_timeout: Duration,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConn>>,
    busy: AtomicUsize,
    waiting: AtomicUsize,
    checked_out: Mutex<HashMap<Uuid, CheckoutRecord>>,
    closed: AtomicBool,
    close_trace: OnceLock<Arc<str>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PoolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEngine").field("name", &self.name).finish_non_exhaustive()
    }
}

impl PoolEngine {
    /// Start the engine: warm the pool to `min_connections` and spawn
    /// the reap task.
    ///
    /// Fails with [`WeirError::Init`] if warming does not finish inside
    /// the connect timeout.
    pub async fn start(config: &PoolConfig, source: InterceptorSource) -> Result<Arc<Self>> {
        let engine = Arc::new(Self {
            name: config.pool_name(),
            source,
            test_query: config.test_query(),
            min_size: config.min_connections,
            max_size: AtomicUsize::new(config.max_connections),
            permit_debt: AtomicUsize::new(0),
            resize_lock: Mutex::new(()),
            max_connection_age: config.max_connection_age(),
            max_idle_time: config.max_idle_time(),
            unreturned_timeout: config.unreturned_conn_timeout(),
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            idle: Mutex::new(VecDeque::new()),
            busy: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
            checked_out: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            close_trace: OnceLock::new(),
            reaper: Mutex::new(None),
        });

        engine.warm(config.connect_timeout()).await?;
        *engine.reaper.lock() = Some(spawn_reaper(Arc::downgrade(&engine)));
        Ok(engine)
    }

    async fn warm(&self, budget: Duration) -> Result<()> {
        let warm = async {
            for _ in 0..self.min_size {
                let conn = self.source.get_connection().await?;
                let now = Instant::now();
                self.idle.lock().push_back(IdleConn {
                    conn,
                    born_at: now,
                    last_returned_at: now,
                });
            }
            Ok::<(), WeirError>(())
        };

        match tokio::time::timeout(budget, warm).await {
            Ok(Ok(())) => {
                tracing::debug!(pool = %self.name, warmed = self.min_size, "pool warmed");
                Ok(())
            }
            Ok(Err(e)) => {
                self.discard_idle().await;
                Err(WeirError::Init(format!(
                    "failed to warm pool to {} connections: {e}",
                    self.min_size
                )))
            }
            Err(_) => {
                self.discard_idle().await;
                Err(WeirError::Init(format!(
                    "timed out warming pool to {} connections within {budget:?}",
                    self.min_size
                )))
            }
        }
    }

    async fn discard_idle(&self) {
        let drained: Vec<IdleConn> = {
            let mut idle = self.idle.lock();
            idle.drain(..).collect()
        };
        for record in drained {
            let _ = record.conn.close().await;
        }
    }

    /// Check out a connection, waiting at most `timeout`.
    ///
    /// Idle connections are validated with the test query before being
    /// handed out; records that fail validation are closed and the
    /// acquisition retries inside the remaining budget. Waiters are
    /// served in FIFO order.
    pub async fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<PooledConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let result = self.acquire_inner(timeout).await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn acquire_inner(self: &Arc<Self>, timeout: Duration) -> Result<PooledConnection> {
        let deadline = Instant::now() + timeout;

        let permit = match tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(self.closed_error()),
            Err(_) => {
                return Err(WeirError::Timeout(format!(
                    "timed out waiting for a connection after {timeout:?}"
                )))
            }
        };

        let mut last_err: Option<WeirError> = None;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(self.closed_error());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(last_err.unwrap_or_else(|| {
                    WeirError::Timeout(format!(
                        "timed out waiting for a connection after {timeout:?}"
                    ))
                }));
            }

            if let Some(record) = self.pop_idle() {
                if record.born_at.elapsed() > self.max_connection_age
                    || record.last_returned_at.elapsed() > self.max_idle_time
                {
                    close_later(record.conn);
                    continue;
                }
                match validate_connection(record.conn.as_ref(), self.test_query, remaining).await {
                    Ok(latency) => {
                        tracing::trace!(pool = %self.name, ?latency, "validated idle connection");
                        if let Err(e) = self.source.decorate(record.conn.as_ref()) {
                            close_later(record.conn);
                            return Err(e);
                        }
                        return Ok(self.admit(record.conn, record.born_at, permit));
                    }
                    Err(e) => {
                        tracing::debug!(
                            pool = %self.name,
                            error = %e,
                            "discarding connection that failed validation"
                        );
                        close_later(record.conn);
                        last_err = Some(e);
                        continue;
                    }
                }
            }

            match tokio::time::timeout(remaining, self.source.get_connection()).await {
                Ok(Ok(conn)) => {
                    if self.closed.load(Ordering::SeqCst) {
                        close_later(conn);
                        return Err(self.closed_error());
                    }
                    return Ok(self.admit(conn, Instant::now(), permit));
                }
                Ok(Err(e @ WeirError::Hook(_))) => return Err(e),
                Ok(Err(e)) => {
                    tracing::debug!(
                        pool = %self.name,
                        error = %e,
                        "driver failed to produce a connection, retrying"
                    );
                    let pause =
                        CREATE_RETRY_DELAY.min(deadline.saturating_duration_since(Instant::now()));
                    if pause.is_zero() {
                        return Err(e);
                    }
                    last_err = Some(e);
                    tokio::time::sleep(pause).await;
                }
                Err(_) => {
                    return Err(last_err.unwrap_or_else(|| {
                        WeirError::Timeout(format!(
                            "timed out waiting for a connection after {timeout:?}"
                        ))
                    }))
                }
            }
        }
    }

    fn pop_idle(&self) -> Option<IdleConn> {
        self.idle.lock().pop_front()
    }

    fn admit(
        self: &Arc<Self>,
        conn: Arc<dyn Connection>,
        born_at: Instant,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection {
        let id = Uuid::new_v4();
        let trace = if self.unreturned_timeout.is_zero() {
            None
        } else {
            Some(Arc::from(Backtrace::force_capture().to_string()))
        };
        self.busy.fetch_add(1, Ordering::SeqCst);
        self.checked_out.lock().insert(
            id,
            CheckoutRecord {
                checked_out_at: Instant::now(),
                trace,
                leak_reported: false,
            },
        );
        PooledConnection {
            id,
            conn: Some(conn),
            born_at,
            permit: Some(permit),
            engine: Arc::clone(self),
        }
    }

    fn return_connection(
        &self,
        id: Uuid,
        conn: Arc<dyn Connection>,
        born_at: Instant,
        permit: OwnedSemaphorePermit,
    ) {
        if self.checked_out.lock().remove(&id).is_none() {
            tracing::warn!(
                pool = %self.name,
                checkout = %id,
                "connection returned with no checkout record"
            );
        }
        self.busy.fetch_sub(1, Ordering::SeqCst);

        if self.closed.load(Ordering::SeqCst) {
            close_later(conn);
        } else if born_at.elapsed() > self.max_connection_age {
            tracing::debug!(pool = %self.name, "evicting returned connection past max age");
            close_later(conn);
        } else if conn.is_closed() {
            tracing::debug!(pool = %self.name, "dropping returned connection that is closed");
        } else {
            // Re-queue before the permit is handed back, so a caller
            // holding a permit and seeing an empty idle set knows the
            // pool really is below capacity.
            let now = Instant::now();
            self.idle.lock().push_back(IdleConn {
                conn,
                born_at,
                last_returned_at: now,
            });
        }

        // Burn the permit if the pool shrank, otherwise hand it back.
        let mut debt = self.permit_debt.load(Ordering::SeqCst);
        let burn = loop {
            if debt == 0 {
                break false;
            }
            match self.permit_debt.compare_exchange_weak(
                debt,
                debt - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break true,
                Err(current) => debt = current,
            }
        };
        if burn {
            permit.forget();
        } else {
            drop(permit);
        }
    }

    /// Current admission threshold.
    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::SeqCst)
    }

    /// Adjust the admission threshold.
    ///
    /// Growing adds permits immediately. Shrinking removes available
    /// permits and records the remainder as debt burned as checked-out
    /// connections return; nothing is closed early.
    pub fn set_max_size(&self, new_max: usize) {
        let _guard = self.resize_lock.lock();
        let old = self.max_size.swap(new_max, Ordering::SeqCst);
        if new_max > old {
            let mut grow = new_max - old;
            // Pay down outstanding debt before minting new permits.
            loop {
                let debt = self.permit_debt.load(Ordering::SeqCst);
                let pay = debt.min(grow);
                if pay == 0 {
                    break;
                }
                if self
                    .permit_debt
                    .compare_exchange(debt, debt - pay, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    grow -= pay;
                    break;
                }
            }
            if grow > 0 {
                self.semaphore.add_permits(grow);
            }
            tracing::debug!(pool = %self.name, from = old, to = new_max, "raised pool max size");
        } else if old > new_max {
            let shrink = old - new_max;
            let forgotten = self.semaphore.forget_permits(shrink);
            if forgotten < shrink {
                self.permit_debt
                    .fetch_add(shrink - forgotten, Ordering::SeqCst);
            }
            tracing::debug!(pool = %self.name, from = old, to = new_max, "lowered pool max size");
        }
    }

    /// One maintenance sweep: evict idle connections past the idle
    /// timeout while keeping the pool at `min_connections`, and warn
    /// once per checkout about connections held longer than the
    /// unreturned-connection timeout.
    pub fn reap(&self) -> ReapSummary {
        if self.closed.load(Ordering::SeqCst) {
            return ReapSummary::default();
        }

        let busy = self.busy.load(Ordering::SeqCst);
        let mut evicted = Vec::new();
        {
            let mut idle = self.idle.lock();
            let mut keep = VecDeque::with_capacity(idle.len());
            let mut total = busy + idle.len();
            while let Some(record) = idle.pop_front() {
                let expired = record.last_returned_at.elapsed() > self.max_idle_time;
                if expired && total > self.min_size {
                    total -= 1;
                    evicted.push(record);
                } else {
                    keep.push_back(record);
                }
            }
            *idle = keep;
        }
        let evicted_count = evicted.len();
        if evicted_count > 0 {
            tracing::debug!(pool = %self.name, evicted = evicted_count, "evicted idle connections");
            for record in evicted {
                close_later(record.conn);
            }
        }

        let mut leaks = 0;
        if !self.unreturned_timeout.is_zero() {
            let mut checked_out = self.checked_out.lock();
            for (id, record) in checked_out.iter_mut() {
                if !record.leak_reported
                    && record.checked_out_at.elapsed() > self.unreturned_timeout
                {
                    record.leak_reported = true;
                    leaks += 1;
                    let trace = record.trace.as_deref().unwrap_or("<no trace captured>");
                    tracing::warn!(
                        pool = %self.name,
                        checkout = %id,
                        held_for = ?record.checked_out_at.elapsed(),
                        "connection not returned within the unreturned-connection timeout\nchecked out at:\n{trace}"
                    );
                }
            }
        }

        ReapSummary {
            evicted: evicted_count,
            leaks,
        }
    }

    /// Current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().len();
        let busy = self.busy.load(Ordering::SeqCst);
        let waiting = self.waiting.load(Ordering::SeqCst);
        PoolStats::new(busy + idle, idle, busy, waiting)
    }

    /// Close the engine: wake every waiter with the closing context,
    /// drain the idle set, and close returning connections as they come
    /// back. Idempotent.
    pub async fn close(&self, trace: Arc<str>) -> Result<()> {
        let _ = self.close_trace.set(trace);
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }
        self.semaphore.close();
        tracing::debug!(
            pool = %self.name,
            busy = self.busy.load(Ordering::SeqCst),
            "closing pool engine"
        );
        self.discard_idle().await;
        Ok(())
    }

    fn closed_error(&self) -> WeirError {
        let trace = self
            .close_trace
            .get()
            .cloned()
            .unwrap_or_else(|| Arc::from("<closing>"));
        WeirError::Closed { trace }
    }
}

fn spawn_reaper(engine: Weak<PoolEngine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match engine.upgrade() {
                Some(engine) => {
                    engine.reap();
                }
                None => break,
            }
        }
    })
}

/// Close a connection from a sync context by handing it to the runtime.
fn close_later(conn: Arc<dyn Connection>) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let _ = handle.spawn(async move {
            let _ = conn.close().await;
        });
    }
}

/// A connection checked out from the pool.
///
/// Dropping the guard returns the connection; release consumes the
/// guard, so a double release cannot be expressed.
pub struct PooledConnection {
    id: Uuid,
    conn: Option<Arc<dyn Connection>>,
    born_at: Instant,
    permit: Option<OwnedSemaphorePermit>,
    engine: Arc<PoolEngine>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").field("id", &self.id).finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Get the underlying connection as an `Arc`
    pub fn inner(&self) -> &Arc<dyn Connection> {
        self.conn.as_ref().expect("connection taken")
    }

    /// Unique id of this checkout
    pub fn checkout_id(&self) -> Uuid {
        self.id
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.inner().as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let (Some(conn), Some(permit)) = (self.conn.take(), self.permit.take()) {
            self.engine
                .return_connection(self.id, conn, self.born_at, permit);
        }
    }
}
