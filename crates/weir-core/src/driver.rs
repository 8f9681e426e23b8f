//! Driver adapter trait

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Connection, DriverProps, Result};

/// Materializes physical connections from a URL and a property bag.
///
/// Implementations are stateless and must be safe to call from many
/// threads concurrently. The property bag is opaque to the adapter; it
/// is assembled upstream and carries at minimum the login, password,
/// socket timeout, and connect timeout, plus any TLS material injected
/// by connection security synthesis.
#[async_trait]
pub trait DriverAdapter: Send + Sync {
    /// Create a fresh physical connection.
    async fn materialize(
        &self,
        url: &str,
        driver_class: &str,
        props: &DriverProps,
    ) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: DriverAdapter> DriverAdapter for Arc<T> {
    async fn materialize(
        &self,
        url: &str,
        driver_class: &str,
        props: &DriverProps,
    ) -> Result<Arc<dyn Connection>> {
        (**self).materialize(url, driver_class, props).await
    }
}
