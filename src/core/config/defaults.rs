use std::time::Duration;

use crate::connection::ConnectionOptions;
use crate::core::config::data::{Config, SessionConfig};
use crate::core::config::io::ConfigError;
use crate::utils::url::{bootstrap_url, validate_endpoint};

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:5000/ws";
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_CEILING_MS: u64 = 10_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 25_000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_BOOTSTRAP_PATH: &str = "/generate_response";
pub const DEFAULT_BOOTSTRAP_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;

impl Config {
    /// A config with every key set to its default, as written by `config init`.
    pub fn with_defaults() -> Self {
        Self {
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            max_reconnect_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            backoff_base_ms: Some(DEFAULT_BACKOFF_BASE_MS),
            backoff_ceiling_ms: Some(DEFAULT_BACKOFF_CEILING_MS),
            connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT_MS),
            heartbeat_interval_ms: Some(DEFAULT_HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout_ms: Some(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            bootstrap_path: Some(DEFAULT_BOOTSTRAP_PATH.to_string()),
            bootstrap_timeout_ms: Some(DEFAULT_BOOTSTRAP_TIMEOUT_MS),
            outbound_buffer: Some(DEFAULT_OUTBOUND_BUFFER),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn bootstrap_path(&self) -> &str {
        self.bootstrap_path
            .as_deref()
            .unwrap_or(DEFAULT_BOOTSTRAP_PATH)
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            max_reconnect_attempts: self
                .max_reconnect_attempts
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            backoff_base: millis(self.backoff_base_ms, DEFAULT_BACKOFF_BASE_MS),
            backoff_ceiling: millis(self.backoff_ceiling_ms, DEFAULT_BACKOFF_CEILING_MS),
            connect_timeout: millis(self.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS),
            heartbeat_interval: millis(self.heartbeat_interval_ms, DEFAULT_HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout: millis(self.heartbeat_timeout_ms, DEFAULT_HEARTBEAT_TIMEOUT_MS),
            outbound_buffer: self.outbound_buffer.unwrap_or(DEFAULT_OUTBOUND_BUFFER),
        }
    }

    /// Resolves the file values (and defaults for anything unset) into the
    /// settings a session runs with.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let endpoint = self.endpoint().trim().to_string();
        validate_endpoint(&endpoint).map_err(|reason| ConfigError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason,
        })?;

        let connection = self.connection_options();
        if connection.max_reconnect_attempts == 0 {
            return Err(invalid_value("max_reconnect_attempts", "must be at least 1"));
        }
        if connection.heartbeat_interval.is_zero() {
            return Err(invalid_value("heartbeat_interval_ms", "must be greater than 0"));
        }
        if connection.outbound_buffer == 0 {
            return Err(invalid_value("outbound_buffer", "must be greater than 0"));
        }
        if connection.backoff_base > connection.backoff_ceiling {
            return Err(invalid_value(
                "backoff_base_ms",
                "must not exceed backoff_ceiling_ms",
            ));
        }

        let bootstrap_url = bootstrap_url(&endpoint, self.bootstrap_path()).map_err(|reason| {
            ConfigError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason,
            }
        })?;

        Ok(SessionConfig {
            endpoint,
            connection,
            bootstrap_url,
            bootstrap_timeout: millis(self.bootstrap_timeout_ms, DEFAULT_BOOTSTRAP_TIMEOUT_MS),
        })
    }
}

fn millis(value: Option<u64>, default: u64) -> Duration {
    Duration::from_millis(value.unwrap_or(default))
}

fn invalid_value(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.to_string(),
    }
}
