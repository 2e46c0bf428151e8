//! [crates/fleet-db/src/job_store.rs]
//! `JobStore` adapter backing the persistent scheduler. The
//! full `JobKind` (including its one-shot payload) round-trips through the
//! `payload` column as JSON; `kind`/`status` are mirrored into plain columns
//! for the due-job scan.

use crate::errors::DbError;
use crate::repositories::job_queries as sql;
use crate::DbClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::result::CoreError;
use fleet_core::scheduler::job_store::JobStore;
use fleet_core::scheduler::jobs::{JobStatus, ScheduledJob};
use libsql::params;
use tracing::instrument;

fn status_tag(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "Pending",
        JobStatus::Running => "Running",
        JobStatus::Completed => "Completed",
        JobStatus::Failed => "Failed",
    }
}

fn status_from_tag(tag: &str) -> JobStatus {
    match tag {
        "Running" => JobStatus::Running,
        "Completed" => JobStatus::Completed,
        "Failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn row_to_job(
    id: String,
    payload: String,
    run_at: String,
    recurrence_seconds: Option<i64>,
    status: String,
    last_run_at: Option<String>,
    last_error: Option<String>,
) -> Result<ScheduledJob, DbError> {
    let kind = serde_json::from_str(&payload).map_err(|e| DbError::MappingError(e.to_string()))?;
    let run_at = DateTime::parse_from_rfc3339(&run_at)
        .map_err(|e| DbError::MappingError(e.to_string()))?
        .with_timezone(&Utc);
    let last_run_at = last_run_at
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| DbError::MappingError(e.to_string()))?;
    Ok(ScheduledJob {
        id,
        kind,
        run_at,
        recurrence_seconds: recurrence_seconds.map(|v| v as u64),
        status: status_from_tag(&status),
        last_run_at,
        last_error,
    })
}

pub struct DbJobStore {
    client: DbClient,
}

impl DbJobStore {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobStore for DbJobStore {
    #[instrument(skip(self, job))]
    async fn upsert(&self, job: &ScheduledJob) -> Result<(), CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let payload = serde_json::to_string(&job.kind).map_err(|e| DbError::MappingError(e.to_string()))?;
        conn.execute(
            sql::UPSERT_JOB,
            params![
                job.id.clone(),
                job.kind.name(),
                payload,
                status_tag(job.status),
                job.run_at.to_rfc3339(),
                job.recurrence_seconds.map(|v| v as i64),
                job.last_run_at.map(|d| d.to_rfc3339()),
                job.last_error.clone(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<ScheduledJob>, CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let mut rows = conn.query(sql::GET_JOB, params![id.to_string()]).await.map_err(DbError::from)?;
        match rows.next().await.map_err(DbError::from)? {
            Some(row) => {
                let id: String = row.get(0).map_err(DbError::from)?;
                let payload: String = row.get(1).map_err(DbError::from)?;
                let run_at: String = row.get(2).map_err(DbError::from)?;
                let recurrence_seconds: Option<i64> = row.get(3).map_err(DbError::from)?;
                let status: String = row.get(4).map_err(DbError::from)?;
                let last_run_at: Option<String> = row.get(5).map_err(DbError::from)?;
                let last_error: Option<String> = row.get(6).map_err(DbError::from)?;
                Ok(Some(row_to_job(id, payload, run_at, recurrence_seconds, status, last_run_at, last_error)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let mut rows = conn
            .query(sql::GET_DUE_JOBS, params![now.to_rfc3339()])
            .await
            .map_err(DbError::from)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(DbError::from)? {
            let id: String = row.get(0).map_err(DbError::from)?;
            let payload: String = row.get(1).map_err(DbError::from)?;
            let run_at: String = row.get(2).map_err(DbError::from)?;
            let recurrence_seconds: Option<i64> = row.get(3).map_err(DbError::from)?;
            let status: String = row.get(4).map_err(DbError::from)?;
            let last_run_at: Option<String> = row.get(5).map_err(DbError::from)?;
            let last_error: Option<String> = row.get(6).map_err(DbError::from)?;
            out.push(row_to_job(id, payload, run_at, recurrence_seconds, status, last_run_at, last_error)?);
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: &str) -> Result<(), CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        conn.execute(sql::DELETE_JOB, params![id.to_string()]).await.map_err(DbError::from)?;
        Ok(())
    }
}
