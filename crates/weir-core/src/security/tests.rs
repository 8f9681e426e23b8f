//! Tests for connection security synthesis

use std::fs;
use std::path::PathBuf;

use super::*;
use crate::DbKind;

fn oracle_config() -> PoolConfig {
    PoolConfig::new(
        "ledger",
        "app",
        "s3cret",
        "jdbc:oracle:thin:@(DESCRIPTION=(ADDRESS=(PROTOCOL=tcps)(HOST=db)(PORT=2484))(CONNECT_DATA=(SID=ledger))",
        "oracle.jdbc.OracleDriver",
        DbKind::Oracle,
    )
}

fn temp_truststore(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("weir-test-{}-{name}.jks", std::process::id()));
    fs::write(&path, b"not a real truststore").expect("write truststore");
    path
}

#[test]
fn test_non_oracle_gets_plain_suffix_and_tcp() {
    let config = PoolConfig::new(
        "orders",
        "app",
        "pw",
        "jdbc:postgresql://db:5432/orders",
        "org.postgresql.Driver",
        DbKind::Postgres,
    );
    let mut props = DriverProps::new();
    let resolved = apply_connection_security(config, &mut props).expect("resolve");

    assert_eq!(resolved.protocol, Some(Protocol::Tcp));
    assert_eq!(resolved.url_suffix.as_deref(), Some(""));
    assert_eq!(resolved.effective_url(), "jdbc:postgresql://db:5432/orders");
    assert!(props.is_empty());
}

#[test]
fn test_oracle_tcp_gets_no_security_suffix() {
    let config = oracle_config().with_protocol(Protocol::Tcp);
    let mut props = DriverProps::new();
    let resolved = apply_connection_security(config, &mut props).expect("resolve");

    assert_eq!(resolved.protocol, Some(Protocol::Tcp));
    assert_eq!(
        resolved.url_suffix.as_deref(),
        Some(ORACLE_NO_SECURITY_URL_SUFFIX)
    );
    assert!(props.is_empty());
}

#[test]
fn test_oracle_defaults_to_tcp_when_protocol_unset() {
    let config = oracle_config();
    let mut props = DriverProps::new();
    let resolved = apply_connection_security(config, &mut props).expect("resolve");
    assert_eq!(resolved.protocol, Some(Protocol::Tcp));
}

#[test]
fn test_oracle_tcps_requires_truststore_path() {
    let config = oracle_config().with_protocol(Protocol::Tcps);
    let mut props = DriverProps::new();
    let err = apply_connection_security(config, &mut props).unwrap_err();
    assert!(err.to_string().contains("truststore_path"));
}

#[test]
fn test_oracle_tcps_with_dn_match_gets_secure_suffix() {
    let truststore = temp_truststore("dn-match");
    let config = oracle_config()
        .with_protocol(Protocol::Tcps)
        .with_truststore_path(&truststore)
        .with_match_server_dn("CN=db");
    let mut props = DriverProps::new();
    let resolved = apply_connection_security(config, &mut props).expect("resolve");
    fs::remove_file(&truststore).ok();

    assert_eq!(props.get("oracle.net.ssl_server_dn_match"), Some("true"));
    assert_eq!(
        props.get("javax.net.ssl.trustStore"),
        Some(truststore.display().to_string().as_str())
    );
    assert_eq!(
        props.get("javax.net.ssl.trustStorePassword"),
        Some(TRUSTSTORE_PASSWORD)
    );
    assert!(resolved.effective_url().ends_with(ORACLE_SECURE_URL_SUFFIX));
}

#[test]
fn test_oracle_tcps_with_empty_dn_gets_no_security_suffix() {
    let truststore = temp_truststore("empty-dn");
    let config = oracle_config()
        .with_protocol(Protocol::Tcps)
        .with_truststore_path(&truststore)
        .with_match_server_dn("");
    let mut props = DriverProps::new();
    let resolved = apply_connection_security(config, &mut props).expect("resolve");
    fs::remove_file(&truststore).ok();

    assert!(props.get("oracle.net.ssl_server_dn_match").is_none());
    assert!(resolved
        .effective_url()
        .ends_with(ORACLE_NO_SECURITY_URL_SUFFIX));
    assert!(!resolved.effective_url().ends_with(ORACLE_SECURE_URL_SUFFIX));
}

#[test]
fn test_oracle_tcps_missing_truststore_file_still_resolves() {
    let config = oracle_config()
        .with_protocol(Protocol::Tcps)
        .with_truststore_path("/nonexistent/weir/truststore.jks")
        .with_match_server_dn("CN=db");
    let mut props = DriverProps::new();
    let resolved = apply_connection_security(config, &mut props).expect("resolve");

    // The missing file is reported but not fatal; the driver may still
    // find a truststore through its own defaults.
    assert!(props.get("javax.net.ssl.trustStore").is_none());
    assert!(resolved.effective_url().ends_with(ORACLE_SECURE_URL_SUFFIX));
}

#[test]
fn test_oracle_two_way_ssl_sets_keystore_props() {
    let truststore = temp_truststore("two-way");
    let config = oracle_config()
        .with_protocol(Protocol::Tcps)
        .with_truststore_path(&truststore)
        .with_two_way_ssl(true)
        .with_keystore("/etc/weir/keystore.jks", "changeit");
    let mut props = DriverProps::new();
    apply_connection_security(config, &mut props).expect("resolve");
    fs::remove_file(&truststore).ok();

    assert_eq!(
        props.get("javax.net.ssl.keyStore"),
        Some("/etc/weir/keystore.jks")
    );
    assert_eq!(props.get("javax.net.ssl.keyStorePassword"), Some("changeit"));
}

#[test]
fn test_oracle_two_way_ssl_requires_keystore() {
    let truststore = temp_truststore("missing-keystore");
    let config = oracle_config()
        .with_protocol(Protocol::Tcps)
        .with_truststore_path(&truststore)
        .with_two_way_ssl(true);
    let mut props = DriverProps::new();
    let err = apply_connection_security(config, &mut props).unwrap_err();
    fs::remove_file(&truststore).ok();
    assert!(err.to_string().contains("keystore_path"));
}
