//! Store configuration, resolved from defaults and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::bus::TAP_CAPACITY;
use crate::db::DbError;

pub const ENV_DB_PATH: &str = "SQLWATCH_DB_PATH";
pub const ENV_FOREIGN_KEYS: &str = "SQLWATCH_FOREIGN_KEYS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "SQLWATCH_BUSY_TIMEOUT_MS";
pub const ENV_LOG_STATEMENTS: &str = "SQLWATCH_LOG_STATEMENTS";
pub const ENV_TAP_CAPACITY: &str = "SQLWATCH_TAP_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file. `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    pub foreign_keys: bool,
    pub busy_timeout: Duration,
    /// Log every statement at trace level.
    pub log_statements: bool,
    pub tap_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            foreign_keys: true,
            busy_timeout: Duration::from_secs(5),
            log_statements: false,
            tap_capacity: TAP_CAPACITY,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Defaults overlaid with any `SQLWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(path) = read(ENV_DB_PATH) {
            if path != ":memory:" {
                cfg.path = Some(PathBuf::from(path));
            }
        }
        if let Some(raw) = read(ENV_FOREIGN_KEYS) {
            cfg.foreign_keys = parse_bool(ENV_FOREIGN_KEYS, &raw)?;
        }
        if let Some(raw) = read(ENV_BUSY_TIMEOUT_MS) {
            let ms: u64 = raw
                .parse()
                .map_err(|e| {
                    DbError::Config(format!("invalid {ENV_BUSY_TIMEOUT_MS} '{raw}': {e}"))
                })?;
            cfg.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = read(ENV_LOG_STATEMENTS) {
            cfg.log_statements = parse_bool(ENV_LOG_STATEMENTS, &raw)?;
        }
        if let Some(raw) = read(ENV_TAP_CAPACITY) {
            let capacity: usize = raw
                .parse()
                .map_err(|e| DbError::Config(format!("invalid {ENV_TAP_CAPACITY} '{raw}': {e}")))?;
            if capacity == 0 {
                return Err(DbError::Config(format!("{ENV_TAP_CAPACITY} must be at least 1")));
            }
            cfg.tap_capacity = capacity;
        }
        Ok(cfg)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, DbError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DbError::Config(format!(
            "invalid {key} '{raw}'. Use true/false, yes/no, on/off or 1/0"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, StoreConfig::default());
        assert!(cfg.path.is_none());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let cfg = StoreConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, "/tmp/app.db"),
            (ENV_FOREIGN_KEYS, "off"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_LOG_STATEMENTS, "yes"),
            (ENV_TAP_CAPACITY, "16"),
        ]))
        .unwrap();

        assert_eq!(cfg.path, Some(PathBuf::from("/tmp/app.db")));
        assert!(!cfg.foreign_keys);
        assert_eq!(cfg.busy_timeout, Duration::from_millis(250));
        assert!(cfg.log_statements);
        assert_eq!(cfg.tap_capacity, 16);
    }

    #[test]
    fn memory_marker_keeps_in_memory_database() {
        let cfg = StoreConfig::from_lookup(lookup(&[(ENV_DB_PATH, ":memory:")])).unwrap();
        assert!(cfg.path.is_none());
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = StoreConfig::from_lookup(lookup(&[(ENV_BUSY_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));

        let err = StoreConfig::from_lookup(lookup(&[(ENV_FOREIGN_KEYS, "maybe")])).unwrap_err();
        assert!(err.to_string().contains(ENV_FOREIGN_KEYS));

        let err = StoreConfig::from_lookup(lookup(&[(ENV_TAP_CAPACITY, "0")])).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
