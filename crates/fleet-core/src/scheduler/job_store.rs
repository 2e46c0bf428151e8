//! [crates/fleet-core/src/scheduler/job_store.rs]
//! Port for the persistent job store. `fleet-db` backs this with
//! a `scheduled_jobs` table; dev/test code can use an in-memory implementation.

use super::jobs::ScheduledJob;
use crate::result::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts or replaces the job with this id (`replace_existing` semantics
    /// for recurrent jobs registered at startup).
    async fn upsert(&self, job: &ScheduledJob) -> Result<(), CoreError>;

    async fn get(&self, id: &str) -> Result<Option<ScheduledJob>, CoreError>;

    /// All jobs whose `run_at` has passed and are still pending.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, CoreError>;

    async fn remove(&self, id: &str) -> Result<(), CoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Enqueued,
    AlreadyScheduled,
}

/// Idempotent one-shot enqueue: a pending job with the same id
/// and a `run_at` within the last 30 seconds is treated as already scheduled.
pub async fn enqueue_one_shot_idempotent(
    store: &dyn JobStore,
    job: ScheduledJob,
    now: DateTime<Utc>,
) -> Result<EnqueueOutcome, CoreError> {
    const DEDUP_WINDOW_SECONDS: i64 = 30;
    if let Some(existing) = store.get(&job.id).await? {
        if existing.status == super::jobs::JobStatus::Pending
            && (now - existing.run_at).num_seconds().abs() <= DEDUP_WINDOW_SECONDS
        {
            return Ok(EnqueueOutcome::AlreadyScheduled);
        }
    }
    store.upsert(&job).await?;
    Ok(EnqueueOutcome::Enqueued)
}
