//! Driver property bag with password redaction

use std::collections::BTreeMap;
use std::fmt;

/// Check whether a property key holds a secret value.
///
/// Any key whose name contains `"pass"` (case-insensitive) is treated
/// as a password and is never logged.
pub fn is_sensitive_key(key: &str) -> bool {
    key.to_ascii_lowercase().contains("pass")
}

/// An opaque bag of driver properties handed to connection
/// materialization.
///
/// Keys iterate in a stable order. Password-valued entries are censored
/// by [`DriverProps::log_redacted`] and by the `Debug` representation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DriverProps {
    entries: BTreeMap<String, String>,
}

impl DriverProps {
    /// Create an empty property bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any previous value for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Get a property value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of properties in the bag.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Log every property at info level, censoring password values.
    pub fn log_redacted(&self) {
        for (key, value) in &self.entries {
            if is_sensitive_key(key) {
                tracing::info!(key = %key, value = "******", "driver property");
            } else {
                tracing::info!(key = %key, value = %value, "driver property");
            }
        }
    }
}

impl fmt::Debug for DriverProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            if is_sensitive_key(key) {
                map.entry(key, &"******");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}
