//! Sink configuration, JSON loading and per-instance overrides.

use std::{path::Path, time::Duration};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    checkpoint::CheckpointSettings,
    error::{SinkError, SinkResult},
};

/// Environment variable read by [`SinkConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "TXSINK_CONFIG";

/// Where and how to reach the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// `sqlite::memory:` or `sqlite://<path>`.
    pub url: String,
    /// Passed to connectors that authenticate; SQLite ignores it.
    pub user: Option<String>,
    /// Passed to connectors that authenticate; SQLite ignores it.
    pub password: Option<String>,
    /// Create the database when it does not exist yet.
    pub create_if_missing: bool,
    /// How long a write waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// DDL executed once right after the connection opens.
    pub init_sql: Option<String>,
    /// Keys not recognized by [`SinkConfig::with_overwrite`].
    pub properties: HashMap<String, String>,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            user: None,
            password: None,
            create_if_missing: true,
            busy_timeout_ms: 5_000,
            init_sql: None,
            properties: HashMap::new(),
        }
    }
}

/// Immutable sink configuration chosen at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// `1` commits every record on its own; larger values buffer.
    pub batch_size: usize,
    /// Upper bound on how long a buffered command waits for a commit.
    pub flush_interval_ms: u64,
    /// Commit whatever is still buffered when the sink closes.
    pub flush_on_close: bool,
    /// Extra commit attempts after a failure; `0` fails fast.
    pub max_retries: u32,
    /// Base backoff between attempts, multiplied by the attempt number.
    pub retry_delay_ms: u64,
    /// Capacity of the channel in front of the flush coordinator.
    pub command_queue_bound: usize,
    /// Target store.
    pub connection: ConnectionParams,
    /// Returned by the sink constructor for the host to apply.
    pub checkpoint: CheckpointSettings,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            flush_interval_ms: 1_000,
            flush_on_close: true,
            max_retries: 0,
            retry_delay_ms: 200,
            command_queue_bound: 256,
            connection: ConnectionParams::default(),
            checkpoint: CheckpointSettings::default(),
        }
    }
}

impl SinkConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> SinkResult<Self> {
        serde_json::from_str(raw).map_err(|err| SinkError::Config(format!("parse error: {err}")))
    }

    /// Reads a JSON document from `path`.
    pub fn from_file(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            SinkError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Reads the JSON document stored in [`CONFIG_ENV_VAR`].
    pub fn from_env() -> SinkResult<Self> {
        let raw = std::env::var(CONFIG_ENV_VAR)
            .map_err(|_| SinkError::Config(format!("{CONFIG_ENV_VAR} is not set")))?;
        Self::from_json_str(&raw)
    }

    /// Merges per-instance overrides over this configuration.
    ///
    /// Unknown keys are kept in `connection.properties`.
    pub fn with_overwrite<I, K, V>(mut self, overrides: I) -> SinkResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in overrides {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "batch.size" => self.batch_size = parse_value(key, value)?,
                "flush.interval.ms" => self.flush_interval_ms = parse_value(key, value)?,
                "flush.on.close" => self.flush_on_close = parse_value(key, value)?,
                "max.retries" => self.max_retries = parse_value(key, value)?,
                "retry.delay.ms" => self.retry_delay_ms = parse_value(key, value)?,
                "url" => self.connection.url = value.to_string(),
                "user" => self.connection.user = Some(value.to_string()),
                "password" => self.connection.password = Some(value.to_string()),
                "create.if.missing" => {
                    self.connection.create_if_missing = parse_value(key, value)?
                }
                "busy.timeout.ms" => self.connection.busy_timeout_ms = parse_value(key, value)?,
                _ => {
                    self.connection
                        .properties
                        .insert(key.to_string(), value.to_string());
                }
            }
        }
        Ok(self)
    }

    /// Rejects values the sink cannot run with.
    pub fn validate(&self) -> SinkResult<()> {
        if self.batch_size == 0 {
            return Err(SinkError::Config("batch size must be at least 1".to_string()));
        }
        if self.flush_interval_ms == 0 {
            return Err(SinkError::Config(
                "flush interval must be at least 1ms".to_string(),
            ));
        }
        if self.command_queue_bound == 0 {
            return Err(SinkError::Config(
                "command queue bound must be at least 1".to_string(),
            ));
        }
        if self.connection.url.trim().is_empty() {
            return Err(SinkError::Config("connection url cannot be empty".to_string()));
        }
        self.checkpoint.validate()
    }

    /// True when every record is committed synchronously.
    pub fn is_immediate(&self) -> bool {
        self.batch_size == 1
    }

    /// [`SinkConfig::flush_interval_ms`] as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// [`SinkConfig::retry_delay_ms`] as a [`Duration`].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> SinkResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SinkError::Config(format!("invalid value {value:?} for {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let cfg = SinkConfig::from_json_str(
            r#"{"batch_size": 50, "connection": {"url": "sqlite:///tmp/x.db"}}"#,
        )
        .expect("parse");
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.flush_interval_ms, 1_000);
        assert!(cfg.flush_on_close);
        assert_eq!(cfg.connection.url, "sqlite:///tmp/x.db");
        assert!(cfg.connection.create_if_missing);
        assert_eq!(cfg.checkpoint, CheckpointSettings::default());
    }

    #[test]
    fn overwrite_merges_known_and_unknown_keys() {
        let cfg = SinkConfig::default()
            .with_overwrite([
                ("batch.size", "100"),
                ("flush.interval.ms", "250"),
                ("user", "writer"),
                ("application.name", "orders"),
            ])
            .expect("overwrite");
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.flush_interval_ms, 250);
        assert_eq!(cfg.connection.user.as_deref(), Some("writer"));
        assert_eq!(
            cfg.connection.properties.get("application.name").map(String::as_str),
            Some("orders")
        );
    }

    #[test]
    fn overwrite_rejects_unparseable_values() {
        let err = SinkConfig::default()
            .with_overwrite([("batch.size", "many")])
            .unwrap_err();
        assert!(matches!(err, SinkError::Config(msg) if msg.contains("batch.size")));
    }

    #[test]
    fn validate_rejects_zero_batch_and_interval() {
        let cfg = SinkConfig {
            batch_size: 0,
            ..SinkConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SinkConfig {
            flush_interval_ms: 0,
            ..SinkConfig::default()
        };
        assert!(cfg.validate().is_err());

        assert!(SinkConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(
            SinkConfig::from_json_str("{"),
            Err(SinkError::Config(_))
        ));
    }
}
