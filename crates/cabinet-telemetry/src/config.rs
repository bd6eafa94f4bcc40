//! Telemetry configuration from environment variables.

use std::env;

/// Logging and metrics settings for one cabinet process.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line.
    pub service_name: String,

    /// Cabinet site identifier (one process per cabinet cluster).
    pub site: String,

    /// Log level filter directive (`info`, `sc_03_transactions=debug`, ...).
    pub log_level: String,

    /// Emit logs to stdout at all.
    pub console_output: bool,

    /// JSON lines instead of human-readable output.
    pub json_logs: bool,

    /// Port the runtime exposes `/metrics` on.
    pub metrics_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "smart-cabinet".to_string(),
            site: "local".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            metrics_port: 9100,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `SC_SERVICE_NAME`: service name (default: smart-cabinet)
    /// - `SC_SITE`: site identifier (default: local)
    /// - `SC_LOG_LEVEL` or `RUST_LOG`: filter directive (default: info)
    /// - `SC_CONSOLE_OUTPUT`: console output (default: true)
    /// - `SC_JSON_LOGS`: JSON logs (default: true inside containers)
    /// - `SC_METRICS_PORT`: Prometheus port (default: 9100)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let is_container = env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("SC_SERVICE_NAME").unwrap_or(defaults.service_name),
            site: env::var("SC_SITE").unwrap_or(defaults.site),
            log_level: env::var("SC_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            console_output: env::var("SC_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.console_output),
            json_logs: env::var("SC_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),
            metrics_port: env::var("SC_METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }

    /// `service@site`, used as the log target prefix.
    pub fn instance_name(&self) -> String {
        format!("{}@{}", self.service_name, self.site)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
