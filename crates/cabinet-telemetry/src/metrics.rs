//! Prometheus metrics for the cabinet subsystems.
//!
//! Naming convention: `sc_<subsystem>_<metric>_<unit>`.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Registry every cabinet metric is registered with.
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // LOCK CONTROL
    // =========================================================================

    /// Lock commands executed against hardware.
    pub static ref LOCK_COMMANDS: CounterVec = CounterVec::new(
        Opts::new("sc_lock_commands_total", "Lock commands executed"),
        &["protocol", "command", "outcome"]  // outcome: success/unsuccessful/error
    ).expect("metric creation failed");

    /// Wall time of one lock command including inter-frame delays.
    pub static ref LOCK_COMMAND_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "sc_lock_command_duration_seconds",
            "Time spent executing a lock command on a serial port"
        ).buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0]),
        &["protocol"]
    ).expect("metric creation failed");

    /// Ports classified per protocol during discovery.
    pub static ref LOCK_PORTS: GaugeVec = GaugeVec::new(
        Opts::new("sc_lock_ports", "Serial ports bound to a lock protocol"),
        &["protocol"]
    ).expect("metric creation failed");

    /// Running lock tracking monitors.
    pub static ref LOCK_TRACKING_ACTIVE: Gauge = Gauge::new(
        "sc_lock_tracking_active",
        "Lock close monitors currently running"
    ).expect("metric creation failed");

    // =========================================================================
    // LOADCELLS
    // =========================================================================

    /// Weight samples ingested, by ingestion path.
    pub static ref LOADCELL_SAMPLES: CounterVec = CounterVec::new(
        Opts::new("sc_loadcell_samples_total", "Weight samples ingested"),
        &["path"]  // path: inline/batched
    ).expect("metric creation failed");

    /// Pending changes committed into available quantity.
    pub static ref QUANTITY_COMMITS: Counter = Counter::new(
        "sc_loadcell_quantity_commits_total",
        "Pending quantity changes committed"
    ).expect("metric creation failed");

    /// Sensors created on first sight.
    pub static ref LOADCELLS_PROVISIONED: Counter = Counter::new(
        "sc_loadcell_provisioned_total",
        "Loadcells auto-provisioned from an unknown hardware id"
    ).expect("metric creation failed");

    /// Completed batch flush cycles.
    pub static ref BATCH_FLUSHES: Counter = Counter::new(
        "sc_loadcell_batch_flushes_total",
        "Batched ingestion flush cycles completed"
    ).expect("metric creation failed");

    /// Timer cycles skipped because a flush was still running.
    pub static ref BATCH_FLUSH_SKIPPED: Counter = Counter::new(
        "sc_loadcell_batch_flush_skipped_total",
        "Batched ingestion cycles skipped by the single-flight guard"
    ).expect("metric creation failed");

    /// Per-unit write failures in bulk writes.
    pub static ref BATCH_UNIT_FAILURES: Counter = Counter::new(
        "sc_loadcell_batch_unit_failures_total",
        "Bulk write units that failed and were dropped"
    ).expect("metric creation failed");

    pub static ref BATCH_FLUSH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "sc_loadcell_batch_flush_duration_seconds",
            "Time spent flushing one batch"
        ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])
    ).expect("metric creation failed");

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    pub static ref TRANSACTIONS_STARTED: CounterVec = CounterVec::new(
        Opts::new("sc_transactions_started_total", "Transactions started"),
        &["type"]
    ).expect("metric creation failed");

    /// Transactions by terminal status.
    pub static ref TRANSACTIONS_FINALIZED: CounterVec = CounterVec::new(
        Opts::new("sc_transactions_finalized_total", "Transactions reaching a terminal status"),
        &["type", "status"]
    ).expect("metric creation failed");

    /// Open attempts by outcome.
    pub static ref OPEN_ATTEMPTS: CounterVec = CounterVec::new(
        Opts::new("sc_transactions_open_attempts_total", "Compartment open attempts"),
        &["outcome"]  // outcome: opened/failed/exhausted
    ).expect("metric creation failed");

    /// Plan violations found, by stage.
    pub static ref VALIDATION_VIOLATIONS: CounterVec = CounterVec::new(
        Opts::new("sc_transactions_validation_violations_total", "Plan violations detected"),
        &["stage"]  // stage: live/final
    ).expect("metric creation failed");

    /// Transactions parked in AWAITING_CORRECTION.
    pub static ref TRANSACTIONS_AWAITING_CORRECTION: Gauge = Gauge::new(
        "sc_transactions_awaiting_correction",
        "Transactions waiting for operator recovery"
    ).expect("metric creation failed");

    // =========================================================================
    // EVENT BUS
    // =========================================================================

    pub static ref EVENT_BUS_MESSAGES: CounterVec = CounterVec::new(
        Opts::new("sc_eventbus_messages_total", "Messages handled via the event bus"),
        &["topic", "direction"]  // direction: sent/received
    ).expect("metric creation failed");

    // =========================================================================
    // ERRORS
    // =========================================================================

    pub static ref SUBSYSTEM_ERRORS: CounterVec = CounterVec::new(
        Opts::new("sc_subsystem_errors_total", "Errors by subsystem and type"),
        &["subsystem", "error_type"]
    ).expect("metric creation failed");
}

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(LOCK_COMMANDS.clone()),
        Box::new(LOCK_COMMAND_DURATION.clone()),
        Box::new(LOCK_PORTS.clone()),
        Box::new(LOCK_TRACKING_ACTIVE.clone()),
        Box::new(LOADCELL_SAMPLES.clone()),
        Box::new(QUANTITY_COMMITS.clone()),
        Box::new(LOADCELLS_PROVISIONED.clone()),
        Box::new(BATCH_FLUSHES.clone()),
        Box::new(BATCH_FLUSH_SKIPPED.clone()),
        Box::new(BATCH_UNIT_FAILURES.clone()),
        Box::new(BATCH_FLUSH_DURATION.clone()),
        Box::new(TRANSACTIONS_STARTED.clone()),
        Box::new(TRANSACTIONS_FINALIZED.clone()),
        Box::new(OPEN_ATTEMPTS.clone()),
        Box::new(VALIDATION_VIOLATIONS.clone()),
        Box::new(TRANSACTIONS_AWAITING_CORRECTION.clone()),
        Box::new(EVENT_BUS_MESSAGES.clone()),
        Box::new(SUBSYSTEM_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Observes the elapsed time into a histogram when dropped.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_gather_contains_cabinet_metrics() {
        register_metrics().unwrap();
        QUANTITY_COMMITS.inc();
        LOCK_COMMANDS
            .with_label_values(&["CU", "OPEN_LOCK", "success"])
            .inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("sc_loadcell_quantity_commits_total"));
        assert!(text.contains("sc_lock_commands_total"));
    }

    #[test]
    fn test_histogram_timer_observes_on_drop() {
        let before = BATCH_FLUSH_DURATION.get_sample_count();
        {
            let _timer = time_histogram!(BATCH_FLUSH_DURATION);
        }
        assert_eq!(BATCH_FLUSH_DURATION.get_sample_count(), before + 1);
    }
}
