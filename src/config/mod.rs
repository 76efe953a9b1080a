//! Configuration module.
//!
//! Endpoint and key are required and come from the environment (optionally via
//! a `.env` file); everything else has a default.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use reqwest::Url;

/// What `upsert_document` does when a document with the same id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Leave the stored document untouched.
    #[default]
    Skip,
    /// Replace the stored document with the new one.
    Overwrite,
    /// Fail with a conflict error.
    Error,
}

impl OnConflict {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnConflict::Skip => "skip",
            OnConflict::Overwrite => "overwrite",
            OnConflict::Error => "error",
        }
    }
}

impl FromStr for OnConflict {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(OnConflict::Skip),
            "overwrite" => Ok(OnConflict::Overwrite),
            "error" => Ok(OnConflict::Error),
            _ => Err(ConfigError::Invalid {
                var: "DOCDB_ON_CONFLICT",
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration problems detected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "missing required variable {}", var),
            ConfigError::Invalid { var, value } => {
                write!(f, "invalid value for {}: {:?}", var, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Service endpoint, e.g. `http://127.0.0.1:8081/`
    pub endpoint: Url,
    /// Opaque authorization key sent with every request
    pub auth_key: String,
    /// Upsert collision policy
    pub on_conflict: OnConflict,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    pub fn new(endpoint: Url, auth_key: impl Into<String>) -> Self {
        Self {
            endpoint,
            auth_key: auth_key.into(),
            on_conflict: OnConflict::default(),
            log_level: "info".to_string(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let raw_endpoint = required("DOCDB_ENDPOINT")?;
        let endpoint = Url::parse(&raw_endpoint).map_err(|_| ConfigError::Invalid {
            var: "DOCDB_ENDPOINT",
            value: raw_endpoint.clone(),
        })?;

        let auth_key = required("DOCDB_KEY")?;

        let on_conflict = match env::var("DOCDB_ON_CONFLICT") {
            Ok(raw) => raw.parse()?,
            Err(_) => OnConflict::default(),
        };

        let log_level = env::var("DOCDB_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            endpoint,
            auth_key,
            on_conflict,
            log_level,
        })
    }
}

/// Emulator configuration.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Pre-shared key clients must present; auth is disabled when unset
    pub auth_key: Option<String>,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    pub log_level: String,
}

impl EmulatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let auth_key = env::var("DOCDB_KEY").ok().filter(|k| !k.is_empty());

        let raw_addr =
            env::var("DOCDB_EMULATOR_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8081".to_string());
        let bind_addr = raw_addr.parse().map_err(|_| ConfigError::Invalid {
            var: "DOCDB_EMULATOR_BIND_ADDR",
            value: raw_addr.clone(),
        })?;

        let log_level = env::var("DOCDB_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            auth_key,
            bind_addr,
            log_level,
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(var)),
    }
}
