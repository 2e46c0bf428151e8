//! [crates/fleet-domain/src/settings.rs]
//! `SystemSettings` — the single hot-reloadable document holding fleet-wide
//! tunables that operators can change without a redeploy. Persisted as one row
//! via `SettingsRepository`; static config (credentials, connection strings)
//! stays in environment variables, never here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProvisioningSettings {
    pub default_instance_type: String,
    pub default_image_id: String,
    pub default_region: String,
    pub max_concurrent_provisions: u32,
}

impl Default for WorkerProvisioningSettings {
    fn default() -> Self {
        Self {
            default_instance_type: "m5.large".to_string(),
            default_image_id: String::new(),
            default_region: "eu-west-1".to_string(),
            max_concurrent_provisions: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    pub change_threshold_percent: f64,
    pub cloud_metrics_poll_interval_seconds: u64,
    pub lab_metrics_poll_interval_seconds: u64,
    /// Window before the fleet metrics job's next scheduled fire inside which
    /// an on-demand refresh request is skipped as redundant.
    pub background_job_imminent_threshold_seconds: u64,
    /// Minimum interval between user-initiated refreshes for the same worker.
    pub refresh_throttle_min_interval_seconds: u64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            change_threshold_percent: crate::change_threshold::DEFAULT_CHANGE_THRESHOLD_PERCENT,
            cloud_metrics_poll_interval_seconds: 60,
            lab_metrics_poll_interval_seconds: 120,
            background_job_imminent_threshold_seconds: 10,
            refresh_throttle_min_interval_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleDetectionSettings {
    pub enabled_by_default: bool,
    pub idle_timeout_minutes: u64,
    pub check_interval_seconds: u64,
}

impl Default for IdleDetectionSettings {
    fn default() -> Self {
        Self {
            enabled_by_default: true,
            idle_timeout_minutes: 30,
            check_interval_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSettings {
    pub worker_provisioning: WorkerProvisioningSettings,
    pub monitoring: MonitoringSettings,
    pub idle_detection: IdleDetectionSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_change_threshold_matches_domain_default() {
        let settings = SystemSettings::default();
        assert_eq!(
            settings.monitoring.change_threshold_percent,
            crate::change_threshold::DEFAULT_CHANGE_THRESHOLD_PERCENT
        );
    }
}
