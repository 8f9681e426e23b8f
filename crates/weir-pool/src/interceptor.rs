//! Interceptor data source
//!
//! Wraps the driver adapter and runs the registered on-acquire hook on
//! every connection it produces, exactly once per produced connection.
//! The pool engine also routes idle re-checkouts through
//! [`InterceptorSource::decorate`] so that every connection handed to a
//! caller has passed the hook since its most recent checkout.

use std::sync::Arc;

use weir_core::{Connection, DriverAdapter, DriverProps, Result, WeirError};

/// Hook invoked on a freshly checked-out connection before it is
/// returned to the caller.
///
/// The hook must be cheap; it may not block on I/O beyond a short
/// health check.
pub type OnAcquireHook = Arc<dyn Fn(&dyn Connection) -> Result<()> + Send + Sync>;

/// A connection source that decorates everything it produces.
pub struct InterceptorSource {
    adapter: Arc<dyn DriverAdapter>,
    url: String,
    driver_class: String,
    props: DriverProps,
    on_acquire: Option<OnAcquireHook>,
}

impl InterceptorSource {
    /// Create a source materializing connections against `url`.
    pub fn new(
        adapter: Arc<dyn DriverAdapter>,
        url: impl Into<String>,
        driver_class: impl Into<String>,
        props: DriverProps,
        on_acquire: Option<OnAcquireHook>,
    ) -> Self {
        Self {
            adapter,
            url: url.into(),
            driver_class: driver_class.into(),
            props,
            on_acquire,
        }
    }

    /// The effective URL connections are materialized against.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Produce a connection and run the on-acquire hook on it.
    ///
    /// A hook failure closes the connection and surfaces as
    /// [`WeirError::Hook`].
    pub async fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        let conn = self
            .adapter
            .materialize(&self.url, &self.driver_class, &self.props)
            .await?;
        if let Err(e) = self.decorate(conn.as_ref()) {
            let _ = conn.close().await;
            return Err(e);
        }
        Ok(conn)
    }

    /// Run the on-acquire hook against `conn`, if one is registered.
    ///
    /// The caller owns the connection and is responsible for closing it
    /// when this fails.
    pub fn decorate(&self, conn: &dyn Connection) -> Result<()> {
        if let Some(hook) = &self.on_acquire {
            if let Err(e) = hook(conn) {
                tracing::warn!(
                    driver = %self.driver_class,
                    error = %e,
                    "on-acquire hook rejected connection"
                );
                return Err(WeirError::Hook(e.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct MockConnection {
        closed: AtomicBool,
    }

    #[async_trait]
    impl Connection for MockConnection {
        fn driver_name(&self) -> &str {
            "mock"
        }

        async fn query(&self, _sql: &str) -> Result<u64> {
            Ok(1)
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct MockAdapter {
        created: AtomicUsize,
        last: parking_lot::Mutex<Option<Arc<MockConnection>>>,
    }

    impl MockAdapter {
        fn new() -> Self {
            Self {
                created: AtomicUsize::new(0),
                last: parking_lot::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl DriverAdapter for MockAdapter {
        async fn materialize(
            &self,
            _url: &str,
            _driver_class: &str,
            _props: &DriverProps,
        ) -> Result<Arc<dyn Connection>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            let conn = Arc::new(MockConnection {
                closed: AtomicBool::new(false),
            });
            *self.last.lock() = Some(Arc::clone(&conn));
            Ok(conn)
        }
    }

    fn source(adapter: Arc<MockAdapter>, hook: Option<OnAcquireHook>) -> InterceptorSource {
        InterceptorSource::new(
            adapter,
            "jdbc:mock://db",
            "mock.Driver",
            DriverProps::new(),
            hook,
        )
    }

    #[tokio::test]
    async fn test_get_connection_without_hook() {
        let adapter = Arc::new(MockAdapter::new());
        let source = source(Arc::clone(&adapter), None);

        let conn = source.get_connection().await.expect("get connection");
        assert_eq!(conn.driver_name(), "mock");
        assert_eq!(adapter.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hook_runs_once_per_connection() {
        let adapter = Arc::new(MockAdapter::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let hook: OnAcquireHook = {
            let calls = Arc::clone(&calls);
            Arc::new(move |_conn| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        let source = source(Arc::clone(&adapter), Some(hook));

        source.get_connection().await.expect("get connection");
        source.get_connection().await.expect("get connection");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hook_failure_closes_connection() {
        let adapter = Arc::new(MockAdapter::new());
        let hook: OnAcquireHook =
            Arc::new(|_conn| Err(WeirError::Validation("session setup failed".to_string())));
        let source = source(Arc::clone(&adapter), Some(hook));

        let err = source.get_connection().await.err().expect("expected error");
        assert!(matches!(err, WeirError::Hook(_)));

        let last = adapter.last.lock().clone().expect("connection created");
        assert!(last.is_closed());
    }

    #[tokio::test]
    async fn test_decorate_runs_hook_against_existing_connection() {
        let adapter = Arc::new(MockAdapter::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let hook: OnAcquireHook = {
            let calls = Arc::clone(&calls);
            Arc::new(move |_conn| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        let source = source(Arc::clone(&adapter), Some(hook));

        let conn = source.get_connection().await.expect("get connection");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        source.decorate(conn.as_ref()).expect("decorate");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
