//! Configuration loading and representation.
//!
//! Values come from an optional JSON file (path in `TALLY_CONFIG`) and are then
//! overridden by environment variables:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` (or `POSTGRES_URI`) | required for the postgres store |
//! | `APP_PORT` | `8080` |
//! | `APP_SHUTDOWN_GRACE_PERIOD` | `10s` |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `TALLY_STORE` | `postgres` |
//! | `TRANSFER_MAX_ATTEMPTS` | `3` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::ledger::RetryPolicy;

/// Which ledger backend the service runs on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown store '{other}', expected 'postgres' or 'memory'")),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub port: u16,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub shutdown_grace_period: Duration,
    pub max_connections: u32,
    pub store: StoreKind,
    pub transfer_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8080,
            shutdown_grace_period: Duration::from_secs(10),
            max_connections: 10,
            store: StoreKind::Postgres,
            transfer_max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("TALLY_CONFIG") {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };

        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("POSTGRES_URI")) {
            config.database_url = Some(url);
        }
        if let Some(v) = lookup("APP_PORT") {
            config.port = parse_var("APP_PORT", &v, |s| s.parse::<u16>().map_err(|e| e.to_string()))?;
        }
        if let Some(v) = lookup("APP_SHUTDOWN_GRACE_PERIOD") {
            config.shutdown_grace_period = parse_var("APP_SHUTDOWN_GRACE_PERIOD", &v, parse_duration)?;
        }
        if let Some(v) = lookup("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = parse_var("DATABASE_MAX_CONNECTIONS", &v, parse_positive)?;
        }
        if let Some(v) = lookup("TALLY_STORE") {
            config.store = parse_var("TALLY_STORE", &v, StoreKind::from_str)?;
        }
        if let Some(v) = lookup("TRANSFER_MAX_ATTEMPTS") {
            config.transfer_max_attempts = parse_var("TRANSFER_MAX_ATTEMPTS", &v, parse_positive)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store == StoreKind::Postgres && self.database_url.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        // The file layer bypasses `parse_positive`, so re-check here.
        for (var, value) in [
            ("DATABASE_MAX_CONNECTIONS", self.max_connections),
            ("TRANSFER_MAX_ATTEMPTS", self.transfer_max_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var,
                    value: value.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.transfer_max_attempts)
    }
}

fn parse_var<T>(
    var: &'static str,
    value: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    parse(value).map_err(|reason| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason,
    })
}

fn parse_positive(s: &str) -> Result<u32, String> {
    match s.trim().parse::<u32>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Parse `500ms`, `30s`, `2m`, `1h`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err("expected a number followed by ms, s, m or h".to_string());
    }
    let n: u64 = digits.parse().map_err(|e| format!("{e}"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(n)),
        "" | "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(n.saturating_mul(3600))),
        other => Err(format!("unknown duration unit '{other}'")),
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{}ms", value.as_millis()))
}
