//! Metrics collection and registry.

use crate::session::StatsSnapshot;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for capture sessions.
pub struct MetricsRegistry {
    registry: Registry,

    // Request metrics
    requested_total: IntCounter,
    rejected_busy_total: IntCounter,
    issued_total: IntCounter,
    issue_failures_total: IntCounter,

    // Completion metrics
    completed_total: IntCounter,
    failed_total: IntCounter,
    decode_failures_total: IntCounter,
    timed_out_total: IntCounter,

    // Device metrics
    parameter_rejections_total: IntCounter,
    preview_failures_total: IntCounter,
    locks_total: IntCounter,
    busy: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Advances a counter to `target`. Counters never go backwards.
fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl MetricsRegistry {
    /// Creates a new registry with all capture metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requested_total = counter(
            &registry,
            "sphere_capture_requested_total",
            "Capture requests received",
        )?;
        let rejected_busy_total = counter(
            &registry,
            "sphere_capture_rejected_busy_total",
            "Capture requests rejected because a capture was in flight",
        )?;
        let issued_total = counter(
            &registry,
            "sphere_capture_issued_total",
            "Captures handed to the device",
        )?;
        let issue_failures_total = counter(
            &registry,
            "sphere_capture_issue_failures_total",
            "Captures the device refused to issue",
        )?;
        let completed_total = counter(
            &registry,
            "sphere_capture_completed_total",
            "Captures that produced an artifact",
        )?;
        let failed_total = counter(
            &registry,
            "sphere_capture_failed_total",
            "Captures that did not produce an artifact",
        )?;
        let decode_failures_total = counter(
            &registry,
            "sphere_capture_decode_failures_total",
            "Captures whose data could not be decoded",
        )?;
        let timed_out_total = counter(
            &registry,
            "sphere_capture_timed_out_total",
            "Captures failed because no completion arrived in time",
        )?;
        let parameter_rejections_total = counter(
            &registry,
            "sphere_capture_parameter_rejections_total",
            "Parameter writes rejected by the device",
        )?;
        let preview_failures_total = counter(
            &registry,
            "sphere_capture_preview_failures_total",
            "Preview starts that failed",
        )?;
        let locks_total = counter(
            &registry,
            "sphere_capture_exposure_locks_total",
            "Exposure locks applied",
        )?;

        let busy = IntGauge::new(
            "sphere_capture_busy",
            "Whether a capture currently holds the busy guard (1=busy, 0=idle)",
        )?;
        registry.register(Box::new(busy.clone()))?;

        Ok(Self {
            registry,
            requested_total,
            rejected_busy_total,
            issued_total,
            issue_failures_total,
            completed_total,
            failed_total,
            decode_failures_total,
            timed_out_total,
            parameter_rejections_total,
            preview_failures_total,
            locks_total,
            busy,
        })
    }

    /// Updates all metrics from a session snapshot.
    pub fn update(&self, snapshot: &StatsSnapshot, busy: bool) {
        advance(&self.requested_total, snapshot.requested);
        advance(&self.rejected_busy_total, snapshot.rejected_busy);
        advance(&self.issued_total, snapshot.issued);
        advance(&self.issue_failures_total, snapshot.issue_failures);

        advance(&self.completed_total, snapshot.completed);
        advance(&self.failed_total, snapshot.failed);
        advance(&self.decode_failures_total, snapshot.decode_failures);
        advance(&self.timed_out_total, snapshot.timed_out);

        advance(&self.parameter_rejections_total, snapshot.parameter_rejections);
        advance(&self.preview_failures_total, snapshot.preview_failures);
        advance(&self.locks_total, snapshot.locks_applied);
        self.busy.set(i64::from(busy));
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
