use crate::core::config::data::Config;
use crate::core::config::defaults::DEFAULT_BOOTSTRAP_TIMEOUT_MS;

impl Config {
    /// Prints the effective value of every key; unset keys show their default.
    pub fn print_all(&self) {
        let connection = self.connection_options();
        println!("Current configuration:");
        println!("  endpoint: {}", self.endpoint());
        println!(
            "  max_reconnect_attempts: {}",
            connection.max_reconnect_attempts
        );
        println!("  backoff_base_ms: {}", connection.backoff_base.as_millis());
        println!(
            "  backoff_ceiling_ms: {}",
            connection.backoff_ceiling.as_millis()
        );
        println!(
            "  connect_timeout_ms: {}",
            connection.connect_timeout.as_millis()
        );
        println!(
            "  heartbeat_interval_ms: {}",
            connection.heartbeat_interval.as_millis()
        );
        println!(
            "  heartbeat_timeout_ms: {}",
            connection.heartbeat_timeout.as_millis()
        );
        println!("  bootstrap_path: {}", self.bootstrap_path());
        println!(
            "  bootstrap_timeout_ms: {}",
            self.bootstrap_timeout_ms
                .unwrap_or(DEFAULT_BOOTSTRAP_TIMEOUT_MS)
        );
        println!("  outbound_buffer: {}", connection.outbound_buffer);
    }
}
