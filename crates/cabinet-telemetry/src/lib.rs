//! # Cabinet Telemetry
//!
//! Logging and metrics shared by every cabinet subsystem.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cabinet_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SC_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `SC_JSON_LOGS` | `false` | JSON log lines |
//! | `SC_CONSOLE_OUTPUT` | `true` | Log to stdout |
//! | `SC_METRICS_PORT` | `9100` | Prometheus exposition port |
//! | `SC_SITE` | `local` | Site identifier |

mod config;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    gather_metrics, register_metrics, HistogramTimer, BATCH_FLUSHES, BATCH_FLUSH_DURATION,
    BATCH_FLUSH_SKIPPED, BATCH_UNIT_FAILURES, EVENT_BUS_MESSAGES, LOADCELLS_PROVISIONED,
    LOADCELL_SAMPLES, LOCK_COMMANDS, LOCK_COMMAND_DURATION, LOCK_PORTS, LOCK_TRACKING_ACTIVE,
    OPEN_ATTEMPTS, QUANTITY_COMMITS, SUBSYSTEM_ERRORS, TRANSACTIONS_AWAITING_CORRECTION,
    TRANSACTIONS_FINALIZED, TRANSACTIONS_STARTED, VALIDATION_VIOLATIONS,
};

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize metrics and logging.
///
/// Hold the returned guard for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    tracing_setup::init_tracing(&config)?;

    Ok(TelemetryGuard { config })
}

/// Keeps telemetry alive; logs a final line when dropped.
pub struct TelemetryGuard {
    config: TelemetryConfig,
}

impl TelemetryGuard {
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.config.instance_name(), "Shutting down telemetry");
    }
}

/// Increment a counter, optionally with label values.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_inc_macro() {
        let before = LOADCELLS_PROVISIONED.get();
        metric_inc!(LOADCELLS_PROVISIONED);
        metric_inc!(OPEN_ATTEMPTS, &["opened"]);
        assert!(LOADCELLS_PROVISIONED.get() >= before + 1.0);
    }
}
