//! Pool configuration types

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DriverProps, Result, WeirError};

/// Database engine kind, selecting the driver adapter and test query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbKind {
    Oracle,
    Postgres,
    H2,
    Mysql,
}

impl DbKind {
    /// The light-weight liveness query run on connections checked out
    /// from the pool.
    pub fn test_query(&self) -> &'static str {
        match self {
            DbKind::Oracle => "SELECT 1 FROM dual",
            DbKind::Postgres | DbKind::H2 | DbKind::Mysql => "SELECT 1",
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbKind::Oracle => "oracle",
            DbKind::Postgres => "postgres",
            DbKind::H2 => "h2",
            DbKind::Mysql => "mysql",
        };
        write!(f, "{name}")
    }
}

/// Wire protocol for engines that distinguish plain and TLS listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Tcp,
    Tcps,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Tcps => write!(f, "tcps"),
        }
    }
}

/// Headroom added to `max_connections` while the pool is elevated.
/// These go to eleven.
pub const DEFAULT_OVERDRIVE: usize = 11;

/// Immutable configuration for a connection pool
///
/// Controls driver selection, credentials, sizing, timeouts, and TLS
/// material. Built once by the configuration provider and handed to the
/// manager; nothing mutates it afterwards.
#[derive(Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Identifier for this connection, used in the pool name
    pub conn_id: String,
    /// Database login
    pub login: String,
    /// Database password; never logged
    pub password: String,
    /// Base JDBC-style URL
    pub url: String,
    /// Suffix appended to the URL at use; resolved by connection
    /// security synthesis when not set explicitly
    #[serde(default)]
    pub url_suffix: Option<String>,
    /// Fully qualified driver class name
    pub driver_class: String,
    /// Database engine kind
    pub db_kind: DbKind,
    /// Wire protocol; defaults to TCP when unset
    #[serde(default)]
    pub protocol: Option<Protocol>,
    /// Minimum number of connections kept warm
    #[serde(default = "defaults::min_connections")]
    pub min_connections: usize,
    /// Maximum number of connections at nominal size
    #[serde(default = "defaults::max_connections")]
    pub max_connections: usize,
    /// Upper bound on a physical connection's lifetime, in seconds
    #[serde(default = "defaults::max_connection_age_s")]
    pub max_connection_age_s: u64,
    /// Idle eviction threshold, in seconds
    #[serde(default = "defaults::max_idle_time_s")]
    pub max_idle_time_s: u64,
    /// Per-acquire wait cap, in milliseconds
    #[serde(default = "defaults::checkout_timeout_ms")]
    pub checkout_timeout_ms: u64,
    /// Socket read timeout passed to the driver, in seconds
    #[serde(default = "defaults::socket_timeout_s")]
    pub socket_timeout_s: u64,
    /// Connect timeout passed to the driver and bounding pool warm-up,
    /// in seconds
    #[serde(default = "defaults::connect_timeout_s")]
    pub connect_timeout_s: u64,
    /// Leak-report threshold, in milliseconds; 0 disables leak
    /// detection
    #[serde(default)]
    pub unreturned_conn_timeout_ms: u64,
    /// Whether to present a client certificate (Oracle "two-way" SSL)
    #[serde(default)]
    pub two_way_ssl: bool,
    /// Path to the client truststore
    #[serde(default)]
    pub truststore_path: Option<PathBuf>,
    /// Path to the client keystore, required for two-way SSL
    #[serde(default)]
    pub keystore_path: Option<PathBuf>,
    /// Keystore password, required for two-way SSL; never logged
    #[serde(default)]
    pub keystore_password: Option<String>,
    /// Server certificate DN the client requires, if any
    #[serde(default)]
    pub match_server_dn: Option<String>,
    /// Elevation headroom added to `max_connections` under checkout
    /// pressure
    #[serde(default = "defaults::overdrive")]
    pub overdrive: usize,
}

mod defaults {
    pub fn min_connections() -> usize {
        1
    }
    pub fn max_connections() -> usize {
        10
    }
    pub fn max_connection_age_s() -> u64 {
        1_800
    }
    pub fn max_idle_time_s() -> u64 {
        600
    }
    pub fn checkout_timeout_ms() -> u64 {
        30_000
    }
    pub fn socket_timeout_s() -> u64 {
        120
    }
    pub fn connect_timeout_s() -> u64 {
        30
    }
    pub fn overdrive() -> usize {
        super::DEFAULT_OVERDRIVE
    }
}

impl PoolConfig {
    /// Create a configuration with default sizing and timeouts.
    pub fn new(
        conn_id: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
        url: impl Into<String>,
        driver_class: impl Into<String>,
        db_kind: DbKind,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            login: login.into(),
            password: password.into(),
            url: url.into(),
            url_suffix: None,
            driver_class: driver_class.into(),
            db_kind,
            protocol: None,
            min_connections: defaults::min_connections(),
            max_connections: defaults::max_connections(),
            max_connection_age_s: defaults::max_connection_age_s(),
            max_idle_time_s: defaults::max_idle_time_s(),
            checkout_timeout_ms: defaults::checkout_timeout_ms(),
            socket_timeout_s: defaults::socket_timeout_s(),
            connect_timeout_s: defaults::connect_timeout_s(),
            unreturned_conn_timeout_ms: 0,
            two_way_ssl: false,
            truststore_path: None,
            keystore_path: None,
            keystore_password: None,
            match_server_dn: None,
            overdrive: defaults::overdrive(),
        }
    }

    /// Set the pool sizing.
    pub fn with_sizing(mut self, min_connections: usize, max_connections: usize) -> Self {
        self.min_connections = min_connections;
        self.max_connections = max_connections;
        self
    }

    /// Set the checkout timeout in milliseconds.
    pub fn with_checkout_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.checkout_timeout_ms = timeout_ms;
        self
    }

    /// Set the connect timeout in seconds.
    pub fn with_connect_timeout_s(mut self, timeout_s: u64) -> Self {
        self.connect_timeout_s = timeout_s;
        self
    }

    /// Set the maximum connection age in seconds.
    pub fn with_max_connection_age_s(mut self, age_s: u64) -> Self {
        self.max_connection_age_s = age_s;
        self
    }

    /// Set the idle eviction threshold in seconds.
    pub fn with_max_idle_time_s(mut self, idle_s: u64) -> Self {
        self.max_idle_time_s = idle_s;
        self
    }

    /// Set the leak-report threshold in milliseconds.
    pub fn with_unreturned_conn_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.unreturned_conn_timeout_ms = timeout_ms;
        self
    }

    /// Set the wire protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Set the truststore path.
    pub fn with_truststore_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.truststore_path = Some(path.into());
        self
    }

    /// Set the client keystore for two-way SSL.
    pub fn with_keystore(
        mut self,
        path: impl Into<PathBuf>,
        password: impl Into<String>,
    ) -> Self {
        self.keystore_path = Some(path.into());
        self.keystore_password = Some(password.into());
        self
    }

    /// Require the server certificate DN to match.
    pub fn with_match_server_dn(mut self, dn: impl Into<String>) -> Self {
        self.match_server_dn = Some(dn.into());
        self
    }

    /// Enable two-way SSL.
    pub fn with_two_way_ssl(mut self, enabled: bool) -> Self {
        self.two_way_ssl = enabled;
        self
    }

    /// Set the elevation headroom. Defaults to [`DEFAULT_OVERDRIVE`].
    pub fn with_overdrive(mut self, overdrive: usize) -> Self {
        self.overdrive = overdrive;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.login.is_empty() {
            return Err(WeirError::Configuration(
                "missing required configuration parameter specifying the database login"
                    .to_string(),
            ));
        }
        if self.url.is_empty() {
            return Err(WeirError::Configuration(
                "missing required configuration parameter specifying the database url".to_string(),
            ));
        }
        if self.driver_class.is_empty() {
            return Err(WeirError::Configuration(
                "missing required configuration parameter specifying the driver class".to_string(),
            ));
        }
        if self.min_connections == 0 {
            return Err(WeirError::Configuration(format!(
                "min_connections must be at least 1, got {}",
                self.min_connections
            )));
        }
        if self.min_connections > self.max_connections {
            return Err(WeirError::Configuration(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.two_way_ssl && (self.keystore_path.is_none() || self.keystore_password.is_none()) {
            return Err(WeirError::Configuration(
                "two_way_ssl requires both keystore_path and keystore_password".to_string(),
            ));
        }
        Ok(())
    }

    /// The liveness query for this configuration's engine.
    pub fn test_query(&self) -> &'static str {
        self.db_kind.test_query()
    }

    /// The URL connections are materialized against: base URL plus the
    /// resolved suffix.
    pub fn effective_url(&self) -> String {
        match &self.url_suffix {
            Some(suffix) => format!("{}{}", self.url, suffix),
            None => self.url.clone(),
        }
    }

    /// Name identifying this pool in logs and statistics.
    pub fn pool_name(&self) -> String {
        format!("db-pool-{}-{}", self.conn_id, self.login)
    }

    /// Assemble the base driver property bag: credentials plus the
    /// socket and connect timeouts. TLS material is added separately by
    /// connection security synthesis.
    pub fn driver_properties(&self) -> DriverProps {
        let mut props = DriverProps::new();
        props.set("user", self.login.clone());
        props.set("password", self.password.clone());
        props.set("socketTimeout", self.socket_timeout_s.to_string());
        props.set("connectTimeout", self.connect_timeout_s.to_string());
        props
    }

    /// Checkout timeout as a `Duration`.
    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_s)
    }

    /// Maximum connection age as a `Duration`.
    pub fn max_connection_age(&self) -> Duration {
        Duration::from_secs(self.max_connection_age_s)
    }

    /// Idle eviction threshold as a `Duration`.
    pub fn max_idle_time(&self) -> Duration {
        Duration::from_secs(self.max_idle_time_s)
    }

    /// Leak-report threshold as a `Duration`; zero disables detection.
    pub fn unreturned_conn_timeout(&self) -> Duration {
        Duration::from_millis(self.unreturned_conn_timeout_ms)
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("conn_id", &self.conn_id)
            .field("login", &self.login)
            .field("password", &"******")
            .field("url", &self.url)
            .field("url_suffix", &self.url_suffix)
            .field("driver_class", &self.driver_class)
            .field("db_kind", &self.db_kind)
            .field("protocol", &self.protocol)
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("max_connection_age_s", &self.max_connection_age_s)
            .field("max_idle_time_s", &self.max_idle_time_s)
            .field("checkout_timeout_ms", &self.checkout_timeout_ms)
            .field("socket_timeout_s", &self.socket_timeout_s)
            .field("connect_timeout_s", &self.connect_timeout_s)
            .field("unreturned_conn_timeout_ms", &self.unreturned_conn_timeout_ms)
            .field("two_way_ssl", &self.two_way_ssl)
            .field("truststore_path", &self.truststore_path)
            .field("keystore_path", &self.keystore_path)
            .field(
                "keystore_password",
                &self.keystore_password.as_ref().map(|_| "******"),
            )
            .field("match_server_dn", &self.match_server_dn)
            .field("overdrive", &self.overdrive)
            .finish()
    }
}
