//! # Cabinet Configuration
//!
//! Unified configuration for all subsystems and runtime parameters.
//! Defaults match the hardware timings; `load_config` applies `SC_*`
//! environment overrides on top.

use sc_01_lock_control::{LockControlConfig, TrackingConfig};
use sc_02_loadcell::LoadcellConfig as LoadcellServiceConfig;
use sc_03_transactions::OrchestratorConfig;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Complete cabinet configuration.
#[derive(Debug, Clone, Default)]
pub struct CabinetConfig {
    pub lock: LockConfig,
    pub loadcell: LoadcellConfig,
    pub transaction: TransactionConfig,
    pub bus: BusConfig,
}

impl CabinetConfig {
    /// Reject values the subsystems cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.baud_rate == 0 {
            return Err(ConfigError::invalid("SC_SERIAL_BAUD", "must be positive"));
        }
        if self.lock.tracking_poll_ms == 0 {
            return Err(ConfigError::invalid("SC_TRACKING_POLL_MS", "must be positive"));
        }
        if self.lock.tracking_ceiling_secs.saturating_mul(1000) <= self.lock.tracking_poll_ms {
            return Err(ConfigError::invalid(
                "SC_TRACKING_CEILING_SECS",
                "must exceed the tracking poll interval",
            ));
        }
        if self.loadcell.batched && self.loadcell.batch_window_ms == 0 {
            return Err(ConfigError::invalid("SC_BATCH_WINDOW_MS", "must be positive when batching"));
        }
        if self.transaction.open_attempts == 0 {
            return Err(ConfigError::invalid("SC_OPEN_ATTEMPTS", "at least one attempt is required"));
        }
        if self.transaction.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("SC_POLL_INTERVAL_MS", "must be positive"));
        }
        if self.bus.channel_capacity == 0 {
            return Err(ConfigError::invalid("SC_BUS_CAPACITY", "must be positive"));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Lock hardware configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Baud rate of the lock control boards.
    pub baud_rate: u32,
    /// Read window of each discovery probe.
    pub probe_timeout_ms: u64,
    pub read_window_ms: u64,
    /// Gap between the frames of a CU command train.
    pub cu_frame_delay_ms: u64,
    pub tracking_poll_ms: u64,
    /// How long a compartment may stay open before tracking gives up.
    pub tracking_ceiling_secs: u64,
    /// Use simulated boards instead of real serial ports.
    pub simulated: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            baud_rate: 19_200,
            probe_timeout_ms: 300,
            read_window_ms: 500,
            cu_frame_delay_ms: 250,
            tracking_poll_ms: 1000,
            tracking_ceiling_secs: 3600,
            simulated: false,
        }
    }
}

impl LockConfig {
    pub fn service_config(&self) -> LockControlConfig {
        LockControlConfig {
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            baud_rate: self.baud_rate,
            read_window: Duration::from_millis(self.read_window_ms),
            cu_frame_delay: Duration::from_millis(self.cu_frame_delay_ms),
        }
    }

    pub fn tracking_config(&self) -> TrackingConfig {
        TrackingConfig {
            poll_interval: Duration::from_millis(self.tracking_poll_ms),
            ceiling: Duration::from_secs(self.tracking_ceiling_secs),
        }
    }
}

/// Weight sensor configuration.
#[derive(Debug, Clone)]
pub struct LoadcellConfig {
    /// Buffer samples and write them in bulk.
    pub batched: bool,
    pub batch_window_ms: u64,
}

impl Default for LoadcellConfig {
    fn default() -> Self {
        Self {
            batched: false,
            batch_window_ms: 1000,
        }
    }
}

impl LoadcellConfig {
    pub fn service_config(&self) -> LoadcellServiceConfig {
        LoadcellServiceConfig {
            batched: self.batched,
            batch_window: Duration::from_millis(self.batch_window_ms),
        }
    }
}

/// Transaction orchestration configuration.
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    pub open_attempts: u32,
    pub retry_delay_ms: u64,
    /// Wait after a successful open before the baseline snapshot.
    pub stabilization_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            open_attempts: 3,
            retry_delay_ms: 2000,
            stabilization_ms: 1500,
            poll_interval_ms: 1000,
        }
    }
}

impl TransactionConfig {
    pub fn service_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            open_attempts: self.open_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            stabilization: Duration::from_millis(self.stabilization_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Events buffered per subscriber.
    pub channel_capacity: usize,
    /// Deadline for lock command replies.
    pub request_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
            request_timeout_ms: shared_bus::DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl BusConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Defaults with environment overrides applied.
pub fn load_config() -> CabinetConfig {
    load_config_from(|key| std::env::var(key).ok())
}

/// Same as [`load_config`], reading variables through `lookup`.
pub fn load_config_from(lookup: impl Fn(&str) -> Option<String>) -> CabinetConfig {
    let mut config = CabinetConfig::default();
    let env = Overrides(&lookup);

    env.value("SC_SERIAL_BAUD", &mut config.lock.baud_rate);
    env.value("SC_PROBE_TIMEOUT_MS", &mut config.lock.probe_timeout_ms);
    env.value("SC_CU_FRAME_DELAY_MS", &mut config.lock.cu_frame_delay_ms);
    env.value("SC_TRACKING_POLL_MS", &mut config.lock.tracking_poll_ms);
    env.value("SC_TRACKING_CEILING_SECS", &mut config.lock.tracking_ceiling_secs);
    env.flag("SC_SIMULATED_HARDWARE", &mut config.lock.simulated);
    env.flag("SC_BATCHED_INGEST", &mut config.loadcell.batched);
    env.value("SC_BATCH_WINDOW_MS", &mut config.loadcell.batch_window_ms);
    env.value("SC_OPEN_ATTEMPTS", &mut config.transaction.open_attempts);
    env.value("SC_RETRY_DELAY_MS", &mut config.transaction.retry_delay_ms);
    env.value("SC_POLL_INTERVAL_MS", &mut config.transaction.poll_interval_ms);
    env.value("SC_BUS_CAPACITY", &mut config.bus.channel_capacity);
    env.value("SC_REQUEST_TIMEOUT_MS", &mut config.bus.request_timeout_ms);

    config
}

struct Overrides<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Overrides<'_, F> {
    fn value<T: FromStr>(&self, key: &str, target: &mut T) {
        let Some(raw) = (self.0)(key) else {
            return;
        };
        match raw.trim().parse() {
            Ok(value) => {
                *target = value;
                info!(key, value = %raw, "Configuration override");
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparsable configuration value"),
        }
    }

    fn flag(&self, key: &str, target: &mut bool) {
        let Some(raw) = (self.0)(key) else {
            return;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => {
                warn!(key, value = %raw, "Ignoring unparsable configuration flag");
                return;
            }
        }
        info!(key, value = %raw, "Configuration override");
    }
}
