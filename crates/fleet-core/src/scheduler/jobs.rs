//! [crates/fleet-core/src/scheduler/jobs.rs]
//! Job payloads as primitive-typed tagged data. A
//! `ScheduledJob` is what gets serialized into the persistent store; it holds
//! no service references. `JobKind::name()` is the stable identifier recurrent
//! jobs are re-registered under, so a restart never duplicates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum JobKind {
    FleetMetrics,
    LabsRefresh,
    ActivityDetection,
    AutoImport,
    OnDemandRefresh { worker_id: String },
}

impl JobKind {
    /// Stable name used as the job's id for recurrent jobs, and as a prefix
    /// for one-shot job ids.
    pub fn name(&self) -> String {
        match self {
            JobKind::FleetMetrics => "fleet_metrics".to_string(),
            JobKind::LabsRefresh => "labs_refresh".to_string(),
            JobKind::ActivityDetection => "activity_detection".to_string(),
            JobKind::AutoImport => "auto_import".to_string(),
            JobKind::OnDemandRefresh { worker_id } => format!("on_demand_refresh_{worker_id}"),
        }
    }

    pub fn is_recurrent(&self) -> bool {
        !matches!(self, JobKind::OnDemandRefresh { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One row of the persistent job store. Plain data — no collaborators — so it
/// round-trips through serialization untouched; `JobRunner` re-hydrates the
/// services a job needs at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub kind: JobKind,
    pub run_at: DateTime<Utc>,
    /// `Some(seconds)` for recurrent jobs, `None` for one-shot jobs.
    pub recurrence_seconds: Option<u64>,
    pub status: JobStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ScheduledJob {
    pub fn recurrent(kind: JobKind, interval_seconds: u64, first_run_at: DateTime<Utc>) -> Self {
        Self {
            id: kind.name(),
            kind,
            run_at: first_run_at,
            recurrence_seconds: Some(interval_seconds),
            status: JobStatus::Pending,
            last_run_at: None,
            last_error: None,
        }
    }

    pub fn one_shot(kind: JobKind, run_at: DateTime<Utc>) -> Self {
        Self {
            id: kind.name(),
            kind,
            run_at,
            recurrence_seconds: None,
            status: JobStatus::Pending,
            last_run_at: None,
            last_error: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.run_at <= now
    }

    pub fn reschedule_after_run(&mut self, now: DateTime<Utc>, error: Option<String>) {
        self.last_run_at = Some(now);
        self.last_error = error;
        match self.recurrence_seconds {
            Some(interval) => {
                self.run_at = now + chrono::Duration::seconds(interval as i64);
                self.status = JobStatus::Pending;
            }
            None => {
                self.status = JobStatus::Completed;
            }
        }
    }
}
