//! weir-core - Core abstractions for the weir database access layer
//!
//! This crate provides the fundamental traits and types that the rest
//! of weir depends on. It defines:
//!
//! - `Connection` - Trait for live physical database connections
//! - `DriverAdapter` - Trait for materializing connections from a URL
//! - `PoolConfig`, `DbKind`, `Protocol` - Pool configuration
//! - `DriverProps` - Driver property bag with password redaction
//! - Connection security synthesis for Oracle TCPS
//! - Small shared utilities (`RngPool`, `Confined`)

mod config;
mod confined;
mod connection;
mod driver;
mod error;
mod props;
mod random;
pub mod security;

pub use config::{DbKind, PoolConfig, Protocol, DEFAULT_OVERDRIVE};
pub use confined::Confined;
pub use connection::Connection;
pub use driver::DriverAdapter;
pub use error::{Result, WeirError};
pub use props::{is_sensitive_key, DriverProps};
pub use random::RngPool;
pub use security::{
    apply_connection_security, ORACLE_NO_SECURITY_URL_SUFFIX, ORACLE_SECURE_URL_SUFFIX,
    TRUSTSTORE_PASSWORD,
};
