//! Connector configuration.
//!
//! `InputConfig` is the raw, serde-facing shape (strings for durations, all
//! fields defaulted). `InputConfig::validate` turns it into the immutable
//! `ConnectorConfig` the connector runs with. Validation does no I/O, so a
//! bad duration fails before any connection is attempted.
//!
//! ```toml
//! host = "localhost:6379"
//! key = "gogstash"
//! connections = 10
//! batch_count = 125
//! blocking_timeout = "600s"
//! ```

use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::InputError;
use crate::util::time::parse_duration;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Redis server `host:port` (or a full `redis://` URL).
    pub host: String,
    /// List to pop items from.
    pub key: String,
    /// Maximum number of pooled connections.
    pub connections: usize,
    /// Items per fetch; 1 selects a plain `BLPOP`.
    pub batch_count: usize,
    /// Upper bound on one blocking fetch, e.g. `"600s"`.
    pub blocking_timeout: String,
    /// Payload codec name (`json`, `plain`).
    pub codec: String,
    /// Pool wait/create/recycle timeout.
    pub connect_timeout: String,
    /// Consecutive fetch failures tolerated before the input gives up.
    pub reconnect_attempts: u32,
    /// Base delay of the reconnect backoff.
    pub reconnect_backoff: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            host: "localhost:6379".to_string(),
            key: "gogstash".to_string(),
            connections: 10,
            batch_count: 125,
            blocking_timeout: "600s".to_string(),
            codec: "json".to_string(),
            connect_timeout: "5s".to_string(),
            reconnect_attempts: 5,
            reconnect_backoff: "200ms".to_string(),
        }
    }
}

/// Validated, immutable settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    pub host: String,
    pub key: String,
    pub connections: usize,
    pub batch_count: usize,
    pub blocking_timeout: Duration,
    pub codec: String,
    pub connect_timeout: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_backoff: Duration,
}

impl ConnectorConfig {
    /// Connection URL for the pool.
    pub fn redis_url(&self) -> String {
        if self.host.starts_with("redis://") || self.host.starts_with("rediss://") {
            self.host.clone()
        } else {
            format!("redis://{}", self.host)
        }
    }

    pub fn is_batched(&self) -> bool {
        self.batch_count > 1
    }
}

impl InputConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, InputError> {
        toml::from_str(raw).map_err(|e| InputError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| InputError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Load from `INPUT_CONFIG` (a TOML file) if set, else from `REDIS_*` vars.
    pub fn from_env() -> Result<Self, InputError> {
        dotenv().ok();
        if let Ok(path) = env::var("INPUT_CONFIG") {
            return Self::from_file(path);
        }

        let mut cfg = Self::default();
        if let Ok(v) = env::var("REDIS_HOST") {
            cfg.host = v;
        }
        if let Ok(v) = env::var("REDIS_KEY") {
            cfg.key = v;
        }
        if let Some(v) = env_number("REDIS_CONNECTIONS")? {
            cfg.connections = v;
        }
        if let Some(v) = env_number("REDIS_BATCH_COUNT")? {
            cfg.batch_count = v;
        }
        if let Ok(v) = env::var("REDIS_BLOCKING_TIMEOUT") {
            cfg.blocking_timeout = v;
        }
        if let Ok(v) = env::var("INPUT_CODEC") {
            cfg.codec = v;
        }
        if let Ok(v) = env::var("REDIS_CONNECT_TIMEOUT") {
            cfg.connect_timeout = v;
        }
        if let Some(v) = env_number("REDIS_RECONNECT_ATTEMPTS")? {
            cfg.reconnect_attempts = v;
        }
        if let Ok(v) = env::var("REDIS_RECONNECT_BACKOFF") {
            cfg.reconnect_backoff = v;
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<ConnectorConfig, InputError> {
        let blocking_timeout = parse_duration(&self.blocking_timeout)?;
        let connect_timeout = parse_duration(&self.connect_timeout)?;
        let reconnect_backoff = parse_duration(&self.reconnect_backoff)?;

        if self.host.trim().is_empty() {
            return Err(InputError::Config("host must not be empty".into()));
        }
        if self.key.is_empty() {
            return Err(InputError::Config("key must not be empty".into()));
        }
        if self.connections == 0 {
            return Err(InputError::Config("connections must be at least 1".into()));
        }
        if self.batch_count == 0 {
            return Err(InputError::Config("batch_count must be at least 1".into()));
        }
        if connect_timeout.is_zero() {
            return Err(InputError::Config("connect_timeout must be positive".into()));
        }

        Ok(ConnectorConfig {
            host: self.host.clone(),
            key: self.key.clone(),
            connections: self.connections,
            batch_count: self.batch_count,
            blocking_timeout,
            codec: self.codec.clone(),
            connect_timeout,
            reconnect_attempts: self.reconnect_attempts,
            reconnect_backoff,
        })
    }
}

fn env_number<T: FromStr>(name: &str) -> Result<Option<T>, InputError> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| InputError::Config(format!("{name} must be a number, got {v:?}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = InputConfig::default().validate().unwrap();
        assert_eq!(cfg.host, "localhost:6379");
        assert_eq!(cfg.key, "gogstash");
        assert_eq!(cfg.connections, 10);
        assert_eq!(cfg.batch_count, 125);
        assert_eq!(cfg.blocking_timeout, Duration::from_secs(600));
        assert_eq!(cfg.reconnect_backoff, Duration::from_millis(200));
        assert!(cfg.is_batched());
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let raw = r#"
            host = "10.0.0.5:6380"
            batch_count = 1
            blocking_timeout = "2s"
        "#;
        let cfg = InputConfig::from_toml_str(raw).unwrap().validate().unwrap();
        assert_eq!(cfg.host, "10.0.0.5:6380");
        assert_eq!(cfg.key, "gogstash");
        assert_eq!(cfg.batch_count, 1);
        assert!(!cfg.is_batched());
        assert_eq!(cfg.blocking_timeout, Duration::from_secs(2));
    }

    #[test]
    fn unknown_toml_field_is_rejected() {
        let err = InputConfig::from_toml_str("hosts = \"x\"").unwrap_err();
        assert!(matches!(err, InputError::Config(_)));
    }

    #[test]
    fn unparsable_blocking_timeout_fails_validation() {
        let cfg = InputConfig {
            blocking_timeout: "abc".into(),
            ..InputConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(InputError::DurationParse(_))));
    }

    #[test]
    fn zero_counts_are_rejected() {
        let zero_batch = InputConfig {
            batch_count: 0,
            ..InputConfig::default()
        };
        assert!(matches!(zero_batch.validate(), Err(InputError::Config(_))));

        let zero_pool = InputConfig {
            connections: 0,
            ..InputConfig::default()
        };
        assert!(matches!(zero_pool.validate(), Err(InputError::Config(_))));
    }

    #[test]
    fn env_number_rejects_non_numeric() {
        env::set_var("LIST_INPUT_TEST_COUNT_BAD", "lots");
        let err = env_number::<usize>("LIST_INPUT_TEST_COUNT_BAD").unwrap_err();
        assert!(matches!(err, InputError::Config(msg) if msg.contains("lots")));

        env::set_var("LIST_INPUT_TEST_COUNT_OK", " 42 ");
        assert_eq!(env_number::<usize>("LIST_INPUT_TEST_COUNT_OK").unwrap(), Some(42));
        assert_eq!(env_number::<usize>("LIST_INPUT_TEST_COUNT_UNSET").unwrap(), None);
    }

    // Only this test touches the variables `from_env` reads.
    #[test]
    fn from_env_prefers_config_file_then_vars() {
        let path = env::temp_dir().join(format!("list-input-{}.toml", std::process::id()));
        fs::write(&path, "key = \"from-file\"\nbatch_count = 7\n").unwrap();
        env::set_var("INPUT_CONFIG", &path);
        env::set_var("REDIS_KEY", "from-env");
        let cfg = InputConfig::from_env().unwrap();
        assert_eq!(cfg.key, "from-file");
        assert_eq!(cfg.batch_count, 7);

        env::remove_var("INPUT_CONFIG");
        fs::remove_file(&path).unwrap();
        let cfg = InputConfig::from_env().unwrap();
        assert_eq!(cfg.key, "from-env");

        env::set_var("REDIS_BATCH_COUNT", "many");
        let err = InputConfig::from_env().unwrap_err();
        assert!(matches!(err, InputError::Config(_)));

        env::remove_var("REDIS_BATCH_COUNT");
        env::remove_var("REDIS_KEY");
    }

    #[test]
    fn redis_url_adds_scheme_once() {
        let mut cfg = InputConfig::default().validate().unwrap();
        assert_eq!(cfg.redis_url(), "redis://localhost:6379");
        cfg.host = "rediss://cache.internal:6380/2".into();
        assert_eq!(cfg.redis_url(), "rediss://cache.internal:6380/2");
    }
}
