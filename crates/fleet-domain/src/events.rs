//! [crates/fleet-domain/src/events.rs]
//! Domain events produced by `WorkerAggregate` methods. Immutable value objects;
//! one concrete variant per state transition. Buffered on the aggregate and
//! published by the repository after a successful write.

use crate::ids::{LabId, WorkerId};
use crate::lab::LabState;
use crate::worker::{ServiceStatus, WorkerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    Created {
        worker_id: WorkerId,
        name: String,
        region: String,
        at: DateTime<Utc>,
    },
    Imported {
        worker_id: WorkerId,
        instance_id: String,
        at: DateTime<Utc>,
    },
    StatusUpdated {
        worker_id: WorkerId,
        old_status: WorkerStatus,
        new_status: WorkerStatus,
        at: DateTime<Utc>,
    },
    ServiceStatusUpdated {
        worker_id: WorkerId,
        old_service_status: ServiceStatus,
        new_service_status: ServiceStatus,
        endpoint: Option<String>,
        at: DateTime<Utc>,
    },
    InstanceAssigned {
        worker_id: WorkerId,
        instance_id: String,
        public_ip: Option<String>,
        private_ip: Option<String>,
        at: DateTime<Utc>,
    },
    LicenseUpdated {
        worker_id: WorkerId,
        at: DateTime<Utc>,
    },
    TelemetryUpdated {
        worker_id: WorkerId,
        cpu_utilization: Option<f64>,
        memory_utilization: Option<f64>,
        at: DateTime<Utc>,
    },
    EndpointUpdated {
        worker_id: WorkerId,
        endpoint: Option<String>,
        at: DateTime<Utc>,
    },
    Terminated {
        worker_id: WorkerId,
        terminated_by: String,
        at: DateTime<Utc>,
    },
    IdleDetected {
        worker_id: WorkerId,
        idle_since: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    Paused {
        worker_id: WorkerId,
        reason: String,
        paused_by: String,
        is_auto: bool,
        at: DateTime<Utc>,
    },
    Resumed {
        worker_id: WorkerId,
        reason: String,
        resumed_by: String,
        is_auto: bool,
        at: DateTime<Utc>,
    },
    TagsUpdated {
        worker_id: WorkerId,
        tags: HashMap<String, String>,
        at: DateTime<Utc>,
    },
    ActivityObserved {
        worker_id: WorkerId,
        observed_at: DateTime<Utc>,
    },
    DataRefreshRequested {
        worker_id: WorkerId,
        requested_by: String,
        at: DateTime<Utc>,
    },
    DataRefreshSkipped {
        worker_id: WorkerId,
        reason: String,
        retry_after_seconds: Option<u64>,
        at: DateTime<Utc>,
    },
    LabRecordCreated {
        worker_id: WorkerId,
        lab_id: LabId,
        at: DateTime<Utc>,
    },
    LabRecordUpdated {
        worker_id: WorkerId,
        lab_id: LabId,
        changed_fields: Vec<String>,
        at: DateTime<Utc>,
    },
    LabStateChanged {
        worker_id: WorkerId,
        lab_id: LabId,
        previous_state: LabState,
        new_state: LabState,
        at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Dot-separated, present-tense wire type name, e.g. `worker.status.updated`.
    pub fn wire_type(&self) -> &'static str {
        match self {
            DomainEvent::Created { .. } => "worker.created",
            DomainEvent::Imported { .. } => "worker.imported",
            DomainEvent::StatusUpdated { .. } => "worker.status.updated",
            DomainEvent::ServiceStatusUpdated { .. } => "worker.service_status.updated",
            DomainEvent::InstanceAssigned { .. } => "worker.instance.assigned",
            DomainEvent::LicenseUpdated { .. } => "worker.license.updated",
            DomainEvent::TelemetryUpdated { .. } => "worker.telemetry.updated",
            DomainEvent::EndpointUpdated { .. } => "worker.endpoint.updated",
            DomainEvent::Terminated { .. } => "worker.terminated",
            DomainEvent::IdleDetected { .. } => "worker.idle.detected",
            DomainEvent::Paused { .. } => "worker.paused",
            DomainEvent::Resumed { .. } => "worker.resumed",
            DomainEvent::TagsUpdated { .. } => "worker.tags.updated",
            DomainEvent::ActivityObserved { .. } => "worker.activity.observed",
            DomainEvent::DataRefreshRequested { .. } => "worker.data_refresh.requested",
            DomainEvent::DataRefreshSkipped { .. } => "worker.data_refresh.skipped",
            DomainEvent::LabRecordCreated { .. } => "lab.record.created",
            DomainEvent::LabRecordUpdated { .. } => "lab.record.updated",
            DomainEvent::LabStateChanged { .. } => "lab.state.changed",
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        match self {
            DomainEvent::Created { worker_id, .. }
            | DomainEvent::Imported { worker_id, .. }
            | DomainEvent::StatusUpdated { worker_id, .. }
            | DomainEvent::ServiceStatusUpdated { worker_id, .. }
            | DomainEvent::InstanceAssigned { worker_id, .. }
            | DomainEvent::LicenseUpdated { worker_id, .. }
            | DomainEvent::TelemetryUpdated { worker_id, .. }
            | DomainEvent::EndpointUpdated { worker_id, .. }
            | DomainEvent::Terminated { worker_id, .. }
            | DomainEvent::IdleDetected { worker_id, .. }
            | DomainEvent::Paused { worker_id, .. }
            | DomainEvent::Resumed { worker_id, .. }
            | DomainEvent::TagsUpdated { worker_id, .. }
            | DomainEvent::ActivityObserved { worker_id, .. }
            | DomainEvent::DataRefreshRequested { worker_id, .. }
            | DomainEvent::DataRefreshSkipped { worker_id, .. }
            | DomainEvent::LabRecordCreated { worker_id, .. }
            | DomainEvent::LabRecordUpdated { worker_id, .. }
            | DomainEvent::LabStateChanged { worker_id, .. } => *worker_id,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::Created { at, .. }
            | DomainEvent::Imported { at, .. }
            | DomainEvent::StatusUpdated { at, .. }
            | DomainEvent::ServiceStatusUpdated { at, .. }
            | DomainEvent::InstanceAssigned { at, .. }
            | DomainEvent::LicenseUpdated { at, .. }
            | DomainEvent::TelemetryUpdated { at, .. }
            | DomainEvent::EndpointUpdated { at, .. }
            | DomainEvent::Terminated { at, .. }
            | DomainEvent::IdleDetected { at, .. }
            | DomainEvent::Paused { at, .. }
            | DomainEvent::Resumed { at, .. }
            | DomainEvent::TagsUpdated { at, .. }
            | DomainEvent::DataRefreshRequested { at, .. }
            | DomainEvent::DataRefreshSkipped { at, .. }
            | DomainEvent::LabRecordCreated { at, .. }
            | DomainEvent::LabRecordUpdated { at, .. }
            | DomainEvent::LabStateChanged { at, .. } => *at,
            DomainEvent::ActivityObserved { observed_at, .. } => *observed_at,
        }
    }
}

/// The wire envelope published on the pub/sub bus and delivered to subscribers.
/// 
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub time: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    pub fn from_domain_event(event: &DomainEvent) -> Self {
        // `DomainEvent` serializes externally tagged (`{"StatusUpdated": {...}}`);
        // unwrap that single-key wrapper so `data` is the flat field map
        // consumers (and `SubscriptionFilter`) expect.
        let tagged = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
        let data = match tagged {
            serde_json::Value::Object(map) => map.into_values().next().unwrap_or(serde_json::Value::Null),
            other => other,
        };
        Self {
            event_type: event.wire_type().to_string(),
            source: "domain.worker".to_string(),
            time: event.at(),
            data,
        }
    }
}
