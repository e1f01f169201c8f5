//! Telemetry configuration from environment variables.

use std::env;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit JSON formatted logs
    pub json_logs: bool,

    /// Include the emitting module path in text logs
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "shard-emulator".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `SE_SERVICE_NAME`: service name (default: shard-emulator)
    /// - `SE_LOG_LEVEL` or `RUST_LOG`: log level (default: info)
    /// - `SE_JSON_LOGS`: JSON output (default: false)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("SE_SERVICE_NAME")
                .unwrap_or_else(|_| "shard-emulator".to_string()),

            log_level: env::var("SE_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("SE_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),

            with_target: env::var("SE_LOG_TARGET")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Configuration for one shard replica.
    pub fn for_node(shard: u64, node: u64) -> Self {
        let mut config = Self::from_env();
        config.service_name = format!("se-s{}n{}", shard, node);
        config
    }

    /// Configuration for the supervisor process.
    pub fn for_supervisor() -> Self {
        let mut config = Self::from_env();
        config.service_name = "se-supervisor".to_string();
        config
    }
}
