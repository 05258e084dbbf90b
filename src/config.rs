//! Runtime configuration, read from the environment (and `.env`).

use crate::client;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({message})")]
    Invalid {
        key: &'static str,
        value: String,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Directory holding `records.json`.
    pub data_dir: PathBuf,
    /// Book payouts into the ledger. Off for deployments without accounting.
    pub ledger_enabled: bool,
    pub live_url: String,
    pub sandbox_url: String,
    pub api_version: String,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: PathBuf::from("."),
            ledger_enabled: true,
            live_url: client::LIVE_URL.to_string(),
            sandbox_url: client::SANDBOX_URL.to_string(),
            api_version: client::API_VERSION.to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(v) = lookup("GOCARDLESS_BIND_ADDR") {
            config.bind_addr = parse("GOCARDLESS_BIND_ADDR", &v)?;
        }
        if let Some(v) = lookup("GOCARDLESS_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("GOCARDLESS_LEDGER_ENABLED") {
            config.ledger_enabled = parse_bool("GOCARDLESS_LEDGER_ENABLED", &v)?;
        }
        if let Some(v) = lookup("GOCARDLESS_LIVE_URL") {
            config.live_url = v;
        }
        if let Some(v) = lookup("GOCARDLESS_SANDBOX_URL") {
            config.sandbox_url = v;
        }
        if let Some(v) = lookup("GOCARDLESS_API_VERSION") {
            config.api_version = v;
        }
        if let Some(v) = lookup("GOCARDLESS_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse("GOCARDLESS_HTTP_TIMEOUT_SECS", &v)?);
        }

        Ok(config)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        message: e.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            message: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.ledger_enabled);
        assert_eq!(config.live_url, client::LIVE_URL);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = from(&[
            ("GOCARDLESS_BIND_ADDR", "0.0.0.0:9000"),
            ("GOCARDLESS_DATA_DIR", "/var/lib/gocardless"),
            ("GOCARDLESS_LEDGER_ENABLED", "off"),
            ("GOCARDLESS_HTTP_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/gocardless"));
        assert!(!config.ledger_enabled);
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values() {
        assert!(from(&[("GOCARDLESS_BIND_ADDR", "nowhere")]).is_err());
        assert!(from(&[("GOCARDLESS_LEDGER_ENABLED", "maybe")]).is_err());
        assert!(from(&[("GOCARDLESS_HTTP_TIMEOUT_SECS", "-1")]).is_err());
    }
}
