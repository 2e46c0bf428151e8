//! [crates/fleet-domain/src/worker.rs]
//! `WorkerAggregate` — the consistency boundary for one CML appliance. Sole
//! owner of its own state; every mutation goes through a method that validates
//! the transition, mutates the relevant fields and registers exactly one
//! `DomainEvent` before returning. State mutation is always a consequence of an
//! event: replaying a worker's published events against a freshly created
//! aggregate must reproduce its persisted state.

use crate::change_threshold::{numeric_changed, DEFAULT_CHANGE_THRESHOLD_PERCENT};
use crate::events::DomainEvent;
use crate::ids::WorkerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Available,
    Unavailable,
    Error,
}

/// Last-sampled cloud instance health, mirrored verbatim from `describe-instance-status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudHealth {
    pub instance_state_detail: Option<String>,
    pub system_status_check: Option<String>,
    pub detailed_monitoring_enabled: bool,
}

/// Lab-service-derived metrics, sampled from `system_health`/`system_stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabMetrics {
    pub lab_service_version: Option<String>,
    pub ready: bool,
    pub labs_count: u32,
    pub license_info: Option<serde_json::Value>,
    pub system_info: Option<serde_json::Value>,
    pub system_health: Option<serde_json::Value>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAggregate {
    // Identity
    pub id: WorkerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,

    // Cloud
    pub region: String,
    pub instance_id: Option<String>,
    pub instance_type: String,
    pub image_id: String,
    pub image_name: Option<String>,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub cloud_tags: HashMap<String, String>,

    // Lifecycle
    pub status: WorkerStatus,

    // Service
    pub service_status: ServiceStatus,

    // Endpoint
    pub https_endpoint: Option<String>,

    // Cloud metrics
    pub cloud_health: CloudHealth,

    // Resource metrics
    pub cpu_utilization: Option<f64>,
    pub memory_utilization: Option<f64>,
    pub cloudwatch_last_collected_at: Option<DateTime<Utc>>,

    // Lab metrics
    pub lab_metrics: LabMetrics,

    // Activity
    pub last_activity_at: Option<DateTime<Utc>>,
    pub is_idle_detection_enabled: bool,
    pub target_pause_at: Option<DateTime<Utc>>,

    // Pause/resume counters
    pub auto_pause_count: u32,
    pub manual_pause_count: u32,
    pub auto_resume_count: u32,
    pub manual_resume_count: u32,
    pub last_paused_at: Option<DateTime<Utc>>,
    pub last_resumed_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub paused_by: Option<String>,

    // Refresh timing
    pub poll_interval: Option<u64>,
    pub next_refresh_at: Option<DateTime<Utc>>,

    // Terminal
    pub terminated_at: Option<DateTime<Utc>>,
    pub terminated_by: Option<String>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pending_events: Vec<DomainEvent>,
}

impl WorkerAggregate {
    pub fn create(
        id: WorkerId,
        name: String,
        region: String,
        instance_type: String,
        image_id: String,
        created_by: String,
        now: DateTime<Utc>,
    ) -> Self {
        let mut agg = Self {
            id,
            name: name.clone(),
            created_at: now,
            created_by,
            region: region.clone(),
            instance_id: None,
            instance_type,
            image_id,
            image_name: None,
            public_ip: None,
            private_ip: None,
            cloud_tags: HashMap::new(),
            status: WorkerStatus::Pending,
            service_status: ServiceStatus::Unavailable,
            https_endpoint: None,
            cloud_health: CloudHealth::default(),
            cpu_utilization: None,
            memory_utilization: None,
            cloudwatch_last_collected_at: None,
            lab_metrics: LabMetrics::default(),
            last_activity_at: None,
            is_idle_detection_enabled: true,
            target_pause_at: None,
            auto_pause_count: 0,
            manual_pause_count: 0,
            auto_resume_count: 0,
            manual_resume_count: 0,
            last_paused_at: None,
            last_resumed_at: None,
            pause_reason: None,
            paused_by: None,
            poll_interval: None,
            next_refresh_at: None,
            terminated_at: None,
            terminated_by: None,
            updated_at: now,
            pending_events: Vec::new(),
        };
        agg.pending_events.push(DomainEvent::Created {
            worker_id: agg.id,
            name,
            region,
            at: now,
        });
        agg
    }

    /// Construct an aggregate imported from an already-existing cloud instance.
    pub fn import_from_existing(
        id: WorkerId,
        name: String,
        region: String,
        instance_id: String,
        instance_type: String,
        image_id: String,
        initial_status: WorkerStatus,
        created_by: String,
        now: DateTime<Utc>,
    ) -> Self {
        let mut agg = Self::create(id, name, region, instance_type, image_id, created_by, now);
        agg.pending_events.clear();
        agg.instance_id = Some(instance_id.clone());
        agg.status = initial_status;
        agg.pending_events.push(DomainEvent::Imported {
            worker_id: agg.id,
            instance_id,
            at: now,
        });
        agg
    }

    pub fn take_pending_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending_events.is_empty()
    }

    fn is_terminated(&self) -> bool {
        matches!(self.status, WorkerStatus::Terminated)
    }

    /// Maps a cloud state string to the fixed local status mapping.
    pub fn status_from_cloud_state(cloud_state: &str) -> WorkerStatus {
        match cloud_state {
            "pending" => WorkerStatus::Pending,
            "running" => WorkerStatus::Running,
            "stopping" => WorkerStatus::Stopping,
            "stopped" => WorkerStatus::Stopped,
            "shutting-down" => WorkerStatus::Terminated,
            "terminated" => WorkerStatus::Terminated,
            _ => WorkerStatus::Pending,
        }
    }

    /// Transitions `status`; a no-op (same value) registers no event and returns
    /// false. Terminated is absorbing: any call once terminated is a no-op.
    pub fn update_status(&mut self, new_status: WorkerStatus, now: DateTime<Utc>) -> bool {
        if self.is_terminated() {
            return false;
        }
        if self.status == new_status {
            return false;
        }
        let old_status = self.status;
        self.status = new_status;
        self.updated_at = now;
        self.pending_events.push(DomainEvent::StatusUpdated {
            worker_id: self.id,
            old_status,
            new_status,
            at: now,
        });
        true
    }

    pub fn update_service_status(
        &mut self,
        new_service_status: ServiceStatus,
        endpoint: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminated() {
            return false;
        }
        let status_changed = self.service_status != new_service_status;
        let endpoint_changed = endpoint.is_some() && endpoint != self.https_endpoint;
        if !status_changed && !endpoint_changed {
            return false;
        }
        let old_service_status = self.service_status;
        self.service_status = new_service_status;
        if let Some(ep) = endpoint.clone() {
            self.https_endpoint = Some(ep);
        }
        self.updated_at = now;
        self.pending_events.push(DomainEvent::ServiceStatusUpdated {
            worker_id: self.id,
            old_service_status,
            new_service_status,
            endpoint,
            at: now,
        });
        true
    }

    /// Fails if `instance_id` is already set to a different value (immutability
    /// invariant); setting it to the same value again is a harmless no-op.
    pub fn assign_instance(
        &mut self,
        instance_id: String,
        public_ip: Option<String>,
        private_ip: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, AggregateError> {
        if self.is_terminated() {
            return Ok(false);
        }
        if let Some(existing) = &self.instance_id {
            if existing != &instance_id {
                return Err(AggregateError::InstanceAlreadyAssigned);
            }
        }
        let changed = self.instance_id.is_none()
            || self.public_ip != public_ip
            || self.private_ip != private_ip;
        if !changed {
            return Ok(false);
        }
        self.instance_id = Some(instance_id.clone());
        self.public_ip = public_ip.clone();
        self.private_ip = private_ip.clone();
        self.updated_at = now;
        self.pending_events.push(DomainEvent::InstanceAssigned {
            worker_id: self.id,
            instance_id,
            public_ip,
            private_ip,
            at: now,
        });
        Ok(true)
    }

    /// Endpoint is derived: `https://<public_ip>` the first time a public IP is
    /// observed and no endpoint is set yet.
    pub fn update_endpoint(
        &mut self,
        endpoint: Option<String>,
        public_ip: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminated() {
            return false;
        }
        let mut changed = false;
        if let Some(ip) = public_ip.clone() {
            if self.public_ip.as_deref() != Some(ip.as_str()) {
                self.public_ip = Some(ip.clone());
                changed = true;
            }
            if self.https_endpoint.is_none() {
                self.https_endpoint = Some(format!("https://{ip}"));
                changed = true;
            }
        }
        if let Some(ep) = endpoint.clone() {
            if self.https_endpoint.as_deref() != Some(ep.as_str()) {
                self.https_endpoint = Some(ep);
                changed = true;
            }
        }
        if !changed {
            return false;
        }
        self.updated_at = now;
        self.pending_events.push(DomainEvent::EndpointUpdated {
            worker_id: self.id,
            endpoint: self.https_endpoint.clone(),
            at: now,
        });
        true
    }

    pub fn update_cloud_health(
        &mut self,
        instance_state_detail: Option<String>,
        system_status_check: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminated() {
            return false;
        }
        let unchanged = self.cloud_health.instance_state_detail == instance_state_detail
            && self.cloud_health.system_status_check == system_status_check;
        if unchanged {
            return false;
        }
        self.cloud_health.instance_state_detail = instance_state_detail;
        self.cloud_health.system_status_check = system_status_check;
        self.updated_at = now;
        true
    }

    /// Registers `TelemetryUpdated` only when a numeric metric moves by at least
    /// `change_threshold_percent` points, or the monitoring flag changes.
    #[allow(clippy::too_many_arguments)]
    pub fn update_cloud_metrics(
        &mut self,
        cpu_utilization: Option<f64>,
        memory_utilization: Option<f64>,
        detailed_monitoring_enabled: bool,
        poll_interval: Option<u64>,
        next_refresh_at: Option<DateTime<Utc>>,
        change_threshold_percent: f64,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminated() {
            return false;
        }
        let cpu_changed =
            numeric_changed(self.cpu_utilization, cpu_utilization, change_threshold_percent);
        let mem_changed = numeric_changed(
            self.memory_utilization,
            memory_utilization,
            change_threshold_percent,
        );
        let monitoring_changed =
            self.cloud_health.detailed_monitoring_enabled != detailed_monitoring_enabled;

        self.cpu_utilization = cpu_utilization;
        self.memory_utilization = memory_utilization;
        self.cloud_health.detailed_monitoring_enabled = detailed_monitoring_enabled;
        self.cloudwatch_last_collected_at = Some(now);
        // Poll-interval/next-refresh hints are always persisted for the UI
        // countdown even when no telemetry event fires.
        self.poll_interval = poll_interval;
        self.next_refresh_at = next_refresh_at;
        self.updated_at = now;

        if !cpu_changed && !mem_changed && !monitoring_changed {
            return false;
        }
        self.pending_events.push(DomainEvent::TelemetryUpdated {
            worker_id: self.id,
            cpu_utilization,
            memory_utilization,
            at: now,
        });
        true
    }

    /// Same change-threshold policy as `update_cloud_metrics`, applied to
    /// lab-service-derived fields. `labs_count` is treated as a magnitude-bearing
    /// numeric field.
    pub fn update_lab_metrics(
        &mut self,
        version: Option<String>,
        system_info: Option<serde_json::Value>,
        system_health: Option<serde_json::Value>,
        license_info: Option<serde_json::Value>,
        ready: bool,
        labs_count: u32,
        change_threshold_percent: f64,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminated() {
            return false;
        }
        let labs_count_changed = numeric_changed(
            Some(self.lab_metrics.labs_count as f64),
            Some(labs_count as f64),
            change_threshold_percent,
        );
        let ready_changed = self.lab_metrics.ready != ready;
        let version_changed = self.lab_metrics.lab_service_version != version;

        self.lab_metrics.lab_service_version = version;
        self.lab_metrics.system_info = system_info;
        self.lab_metrics.system_health = system_health;
        self.lab_metrics.license_info = license_info;
        self.lab_metrics.ready = ready;
        self.lab_metrics.labs_count = labs_count;
        self.lab_metrics.last_synced_at = Some(now);
        self.updated_at = now;

        if !labs_count_changed && !ready_changed && !version_changed {
            return false;
        }
        self.pending_events.push(DomainEvent::TelemetryUpdated {
            worker_id: self.id,
            cpu_utilization: self.cpu_utilization,
            memory_utilization: self.memory_utilization,
            at: now,
        });
        if version_changed {
            self.pending_events.push(DomainEvent::LicenseUpdated {
                worker_id: self.id,
                at: now,
            });
        }
        true
    }

    pub fn update_cloud_tags(&mut self, tags: HashMap<String, String>, now: DateTime<Utc>) -> bool {
        if self.is_terminated() {
            return false;
        }
        if self.cloud_tags == tags {
            return false;
        }
        self.cloud_tags = tags.clone();
        self.updated_at = now;
        self.pending_events.push(DomainEvent::TagsUpdated {
            worker_id: self.id,
            tags,
            at: now,
        });
        true
    }

    /// Updates instance type/image/IP details observed from `describe-instance`;
    /// auto-populates the endpoint the first time a public IP appears.
    pub fn update_instance_details(
        &mut self,
        instance_type: String,
        image_id: String,
        image_name: Option<String>,
        public_ip: Option<String>,
        private_ip: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminated() {
            return false;
        }
        let mut changed = false;
        if self.instance_type != instance_type {
            self.instance_type = instance_type;
            changed = true;
        }
        if self.image_id != image_id {
            self.image_id = image_id;
            changed = true;
        }
        if self.image_name != image_name {
            self.image_name = image_name;
            changed = true;
        }
        if self.private_ip != private_ip {
            self.private_ip = private_ip;
            changed = true;
        }
        let endpoint_changed = self.update_endpoint(None, public_ip, now);
        if changed {
            self.updated_at = now;
        }
        changed || endpoint_changed
    }

    pub fn terminate(&mut self, terminated_by: String, now: DateTime<Utc>) -> bool {
        if self.is_terminated() {
            return false;
        }
        self.status = WorkerStatus::Terminated;
        self.terminated_at = Some(now);
        self.terminated_by = Some(terminated_by.clone());
        self.updated_at = now;
        self.pending_events.push(DomainEvent::Terminated {
            worker_id: self.id,
            terminated_by,
            at: now,
        });
        true
    }

    pub fn pause(&mut self, reason: String, paused_by: String, is_auto: bool, now: DateTime<Utc>) -> bool {
        if self.is_terminated() {
            return false;
        }
        if is_auto {
            self.auto_pause_count += 1;
        } else {
            self.manual_pause_count += 1;
        }
        self.last_paused_at = Some(now);
        self.pause_reason = Some(reason.clone());
        self.paused_by = Some(paused_by.clone());
        self.updated_at = now;
        self.pending_events.push(DomainEvent::Paused {
            worker_id: self.id,
            reason,
            paused_by,
            is_auto,
            at: now,
        });
        true
    }

    pub fn resume(
        &mut self,
        reason: String,
        resumed_by: String,
        is_auto: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminated() {
            return false;
        }
        if is_auto {
            self.auto_resume_count += 1;
        } else {
            self.manual_resume_count += 1;
        }
        self.last_resumed_at = Some(now);
        self.target_pause_at = None;
        self.updated_at = now;
        self.pending_events.push(DomainEvent::Resumed {
            worker_id: self.id,
            reason,
            resumed_by,
            is_auto,
            at: now,
        });
        true
    }

    /// Registers a synthetic event used by the relay for UI hints; mutates no
    /// domain field.
    pub fn skip_data_refresh(
        &mut self,
        reason: String,
        retry_after_seconds: Option<u64>,
        now: DateTime<Utc>,
    ) {
        if self.is_terminated() {
            return;
        }
        self.pending_events.push(DomainEvent::DataRefreshSkipped {
            worker_id: self.id,
            reason,
            retry_after_seconds,
            at: now,
        });
    }

    pub fn request_data_refresh(&mut self, requested_at: DateTime<Utc>, requested_by: String) {
        if self.is_terminated() {
            return;
        }
        self.pending_events.push(DomainEvent::DataRefreshRequested {
            worker_id: self.id,
            requested_by,
            at: requested_at,
        });
    }

    pub fn record_activity(&mut self, observed_at: DateTime<Utc>) {
        if self.is_terminated() {
            return;
        }
        self.last_activity_at = Some(observed_at);
        self.updated_at = observed_at;
        self.pending_events.push(DomainEvent::ActivityObserved {
            worker_id: self.id,
            observed_at,
        });
    }

    pub fn set_idle_detection(&mut self, enabled: bool) -> bool {
        if self.is_terminated() || self.is_idle_detection_enabled == enabled {
            return false;
        }
        self.is_idle_detection_enabled = enabled;
        true
    }
}

pub fn default_change_threshold() -> f64 {
    DEFAULT_CHANGE_THRESHOLD_PERCENT
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AggregateError {
    #[error("instance_id is already assigned to a different value")]
    InstanceAlreadyAssigned,
}
