//! Observability for the extraction engine
//!
//! Provides:
//! - Prometheus metrics (interval throughput, delegate outcomes, source errors, latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for per-interval analysis latency (in seconds)
const ANALYSIS_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DrillMetricsInner> = OnceLock::new();

struct DrillMetricsInner {
    analysis_latency_seconds: Histogram,
    intervals_analyzed: IntCounter,
    intervals_skipped: IntCounter,
    comparisons_evaluated: IntCounterVec,
    anomalies_flagged: IntCounterVec,
    delegate_calls: IntCounter,
    delegate_failures: IntCounter,
    delegate_timeouts: IntCounter,
    source_errors: IntCounterVec,
}

impl DrillMetricsInner {
    fn new() -> Self {
        Self {
            analysis_latency_seconds: register_histogram!(
                "metric_drill_analysis_latency_seconds",
                "Time spent analysing one fault interval",
                ANALYSIS_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),

            intervals_analyzed: register_int_counter!(
                "metric_drill_intervals_analyzed_total",
                "Fault intervals analysed"
            )
            .expect("Failed to register intervals_analyzed"),

            intervals_skipped: register_int_counter!(
                "metric_drill_intervals_skipped_total",
                "Fault intervals skipped as malformed"
            )
            .expect("Failed to register intervals_skipped"),

            comparisons_evaluated: register_int_counter_vec!(
                "metric_drill_comparisons_total",
                "Metric comparisons evaluated, by source",
                &["source"]
            )
            .expect("Failed to register comparisons_evaluated"),

            anomalies_flagged: register_int_counter_vec!(
                "metric_drill_anomalies_flagged_total",
                "Metrics classified as changed, by source",
                &["source"]
            )
            .expect("Failed to register anomalies_flagged"),

            delegate_calls: register_int_counter!(
                "metric_drill_delegate_calls_total",
                "Shortlist delegate invocations"
            )
            .expect("Failed to register delegate_calls"),

            delegate_failures: register_int_counter!(
                "metric_drill_delegate_failures_total",
                "Shortlist delegate calls that returned an error"
            )
            .expect("Failed to register delegate_failures"),

            delegate_timeouts: register_int_counter!(
                "metric_drill_delegate_timeouts_total",
                "Shortlist delegate calls that exceeded their timeout"
            )
            .expect("Failed to register delegate_timeouts"),

            source_errors: register_int_counter_vec!(
                "metric_drill_source_errors_total",
                "Backing table reads that failed, by source",
                &["source"]
            )
            .expect("Failed to register source_errors"),
        }
    }
}

/// Lightweight handle to the global metrics instance
///
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct DrillMetrics {
    _private: (),
}

impl Default for DrillMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DrillMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DrillMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DrillMetricsInner {
        GLOBAL_METRICS.get_or_init(DrillMetricsInner::new)
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }

    pub fn inc_intervals_analyzed(&self) {
        self.inner().intervals_analyzed.inc();
    }

    pub fn inc_intervals_skipped(&self, count: u64) {
        self.inner().intervals_skipped.inc_by(count);
    }

    pub fn inc_comparisons(&self, source: &str) {
        self.inner().comparisons_evaluated.with_label_values(&[source]).inc();
    }

    pub fn inc_anomalies_flagged(&self, source: &str) {
        self.inner().anomalies_flagged.with_label_values(&[source]).inc();
    }

    pub fn inc_delegate_calls(&self) {
        self.inner().delegate_calls.inc();
    }

    pub fn inc_delegate_failures(&self) {
        self.inner().delegate_failures.inc();
    }

    pub fn inc_delegate_timeouts(&self) {
        self.inner().delegate_timeouts.inc();
    }

    pub fn inc_source_errors(&self, source: &str) {
        self.inner().source_errors.with_label_values(&[source]).inc();
    }
}

/// Structured logger for run-level events
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn log_startup(&self, version: &str, topology_version: u32, delegate: &str) {
        info!(
            event = "run_started",
            run_id = %self.run_id,
            version = %version,
            topology_version = topology_version,
            delegate = %delegate,
            "Metric drill run started"
        );
    }

    pub fn log_interval_analyzed(
        &self,
        uuid: &str,
        index: usize,
        baseline_windows: usize,
        flagged: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "interval_analyzed",
            run_id = %self.run_id,
            uuid = %uuid,
            index = index,
            baseline_windows = baseline_windows,
            flagged = flagged,
            elapsed_ms = elapsed_ms as u64,
            "Fault interval analysed"
        );
    }

    pub fn log_interval_skipped(&self, row: usize, reason: &str) {
        warn!(
            event = "interval_skipped",
            run_id = %self.run_id,
            row = row,
            reason = %reason,
            "Malformed fault interval skipped"
        );
    }

    pub fn log_shortlist(&self, service: &str, delegate: &str, shortlist: &[String]) {
        info!(
            event = "shortlist_received",
            run_id = %self.run_id,
            service = %service,
            delegate = %delegate,
            shortlist = ?shortlist,
            "Shortlist accepted for drill-down"
        );
    }

    pub fn log_delegate_degraded(&self, service: &str, delegate: &str, reason: &str) {
        warn!(
            event = "delegate_degraded",
            run_id = %self.run_id,
            service = %service,
            delegate = %delegate,
            reason = %reason,
            "Shortlist delegate unavailable, drill-down skipped"
        );
    }

    pub fn log_shutdown(&self, analyzed: usize, failed: usize) {
        info!(
            event = "run_finished",
            run_id = %self.run_id,
            analyzed = analyzed,
            failed = failed,
            "Metric drill run finished"
        );
    }
}
