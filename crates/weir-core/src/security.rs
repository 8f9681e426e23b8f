//! Connection security synthesis
//!
//! Resolves the wire protocol and TLS material for a pool
//! configuration: injects the driver properties the engine needs and
//! settles the URL suffix. Currently Oracle-specific; every other
//! engine gets the plain suffix and a TCP default.

use crate::{DbKind, DriverProps, PoolConfig, Protocol, Result, WeirError};

/// URL suffix closing an Oracle TNS descriptor with server DN matching.
pub const ORACLE_SECURE_URL_SUFFIX: &str = "(SECURITY=(SSL_SERVER_DN_MATCH=TRUE)))";

/// URL suffix closing an Oracle TNS descriptor without DN matching.
pub const ORACLE_NO_SECURITY_URL_SUFFIX: &str = ")";

/// Historical default password for the client truststore. Callers
/// needing a different one must override the property afterwards.
pub const TRUSTSTORE_PASSWORD: &str = "ptclient";

/// Resolve protocol and TLS material for `config`.
///
/// Returns the configuration with its URL suffix and protocol settled;
/// TLS properties are added to `props`. Must run before the driver
/// adapter sees the URL.
pub fn apply_connection_security(
    mut config: PoolConfig,
    props: &mut DriverProps,
) -> Result<PoolConfig> {
    if config.db_kind != DbKind::Oracle {
        if config.protocol.is_none() {
            config.protocol = Some(Protocol::Tcp);
        }
        if config.url_suffix.is_none() {
            config.url_suffix = Some(String::new());
        }
        return Ok(config);
    }
    apply_oracle_security(config, props)
}

fn apply_oracle_security(mut config: PoolConfig, props: &mut DriverProps) -> Result<PoolConfig> {
    let protocol = config.protocol.unwrap_or_default();
    tracing::info!(%protocol, "database protocol");

    if protocol == Protocol::Tcps {
        let truststore = config.truststore_path.clone().ok_or_else(|| {
            WeirError::Configuration("protocol tcps requires a truststore_path".to_string())
        })?;

        if truststore.exists() {
            props.set(
                "javax.net.ssl.trustStore",
                truststore.display().to_string(),
            );
            props.set("javax.net.ssl.trustStorePassword", TRUSTSTORE_PASSWORD);
        } else {
            tracing::error!(
                path = %truststore.display(),
                "truststore does not exist at the expected location, pool init may fail"
            );
        }

        match config.match_server_dn.as_deref() {
            Some(dn) if !dn.is_empty() => {
                props.set("oracle.net.ssl_server_dn_match", "true");
                tracing::info!(dn = %dn, "requiring the server certificate DN to match");
                config.url_suffix = Some(ORACLE_SECURE_URL_SUFFIX.to_string());
            }
            _ => {
                config.url_suffix = Some(ORACLE_NO_SECURITY_URL_SUFFIX.to_string());
            }
        }

        if config.two_way_ssl {
            let keystore = config.keystore_path.clone().ok_or_else(|| {
                WeirError::Configuration("two_way_ssl requires a keystore_path".to_string())
            })?;
            let keystore_password = config.keystore_password.clone().ok_or_else(|| {
                WeirError::Configuration("two_way_ssl requires a keystore_password".to_string())
            })?;
            props.set("javax.net.ssl.keyStore", keystore.display().to_string());
            props.set("javax.net.ssl.keyStorePassword", keystore_password);
        }
    } else {
        config.url_suffix = Some(ORACLE_NO_SECURITY_URL_SUFFIX.to_string());
        config.protocol = Some(Protocol::Tcp);
    }

    Ok(config)
}

#[cfg(test)]
mod tests;
