//! [crates/fleet-domain/src/change_threshold.rs]
//! Shared change-threshold policy used by `WorkerAggregate::update_cloud_metrics`
//! and `::update_lab_metrics` to suppress spurious `TelemetryUpdated` broadcasts.
//!
//! A numeric metric (already expressed in percentage points, e.g. CPU/memory
//! utilization) is considered changed only when it moves by at least
//! `threshold_percent` points. A metric transitioning between `Some`/`None` always
//! counts as changed — absence of a reading is itself a state worth broadcasting.

/// Default percentage-point threshold below which numeric metric deltas are
/// suppressed. Overridden by `system_settings.monitoring.change_threshold_percent`.
pub const DEFAULT_CHANGE_THRESHOLD_PERCENT: f64 = 5.0;

pub fn numeric_changed(old: Option<f64>, new: Option<f64>, threshold_percent: f64) -> bool {
    match (old, new) {
        (None, None) => false,
        (None, Some(_)) | (Some(_), None) => true,
        (Some(old), Some(new)) => (old - new).abs() >= threshold_percent,
    }
}
