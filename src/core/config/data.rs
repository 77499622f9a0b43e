use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::ConnectionOptions;

/// On-disk configuration. Every key is optional; unset keys fall back to the
/// values in [`super::defaults`].
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// WebSocket address of the conversation service (`ws://` or `wss://`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Consecutive failed connect attempts before the session gives up
    #[serde(
        alias = "maxReconnectAttempts",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_reconnect_attempts: Option<u32>,
    #[serde(alias = "backoffBaseMs", skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
    #[serde(alias = "backoffCeilingMs", skip_serializing_if = "Option::is_none")]
    pub backoff_ceiling_ms: Option<u64>,
    #[serde(alias = "connectTimeoutMs", skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(
        alias = "heartbeatIntervalMs",
        skip_serializing_if = "Option::is_none"
    )]
    pub heartbeat_interval_ms: Option<u64>,
    /// Extra silence tolerated after a heartbeat before the link is dropped
    #[serde(alias = "heartbeatTimeoutMs", skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout_ms: Option<u64>,
    /// Path of the bootstrap resource, resolved against the endpoint's host
    #[serde(alias = "bootstrapPath", skip_serializing_if = "Option::is_none")]
    pub bootstrap_path: Option<String>,
    #[serde(alias = "bootstrapTimeoutMs", skip_serializing_if = "Option::is_none")]
    pub bootstrap_timeout_ms: Option<u64>,
    #[serde(alias = "outboundBuffer", skip_serializing_if = "Option::is_none")]
    pub outbound_buffer: Option<usize>,
}

/// Validated settings a session runs with.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: String,
    pub connection: ConnectionOptions,
    pub bootstrap_url: String,
    pub bootstrap_timeout: Duration,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/confab/config.toml` → `~/.config/confab/config.toml`
/// - Windows: `C:\\Users\\user\\AppData\\Roaming\\confab\\config\\config.toml` is returned unchanged
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    /// Applies command-line overrides on top of the file values.
    pub fn apply_overrides(&mut self, endpoint: Option<String>, max_reconnect_attempts: Option<u32>) {
        if let Some(endpoint) = endpoint {
            self.endpoint = Some(endpoint);
        }
        if let Some(attempts) = max_reconnect_attempts {
            self.max_reconnect_attempts = Some(attempts);
        }
    }
}
