//! [crates/fleet-db/src/repositories/worker_repository.rs]
//! `WorkerRepository` adapter: a struct holding a connection, a queries
//! module of SQL string constants, `libsql::params!` for binding, and a
//! document-per-row model since the aggregate's shape is far richer than a
//! single heartbeat row. Publishes an aggregate's pending events through the
//! relay only after its write has committed successfully.

use super::worker_queries as sql;
use crate::errors::DbError;
use crate::DbClient;
use async_trait::async_trait;
use chrono::Utc;
use fleet_core::relay::EventRelay;
use fleet_core::repositories::WorkerRepository;
use fleet_core::result::CoreError;
use fleet_domain::{WorkerAggregate, WorkerId, WorkerStatus};
use libsql::params;
use std::sync::Arc;
use tracing::instrument;

pub(crate) fn status_tag(status: WorkerStatus) -> &'static str {
    match status {
        WorkerStatus::Pending => "Pending",
        WorkerStatus::Running => "Running",
        WorkerStatus::Stopping => "Stopping",
        WorkerStatus::Stopped => "Stopped",
        WorkerStatus::ShuttingDown => "ShuttingDown",
        WorkerStatus::Terminated => "Terminated",
        WorkerStatus::Unknown => "Unknown",
    }
}

fn row_to_worker(document: String) -> Result<WorkerAggregate, DbError> {
    serde_json::from_str(&document).map_err(|e| DbError::MappingError(e.to_string()))
}

pub struct DbWorkerRepository {
    client: DbClient,
    relay: Arc<EventRelay>,
}

impl DbWorkerRepository {
    pub fn new(client: DbClient, relay: Arc<EventRelay>) -> Self {
        Self { client, relay }
    }

    async fn publish_pending(&self, agg: &mut WorkerAggregate) {
        for event in agg.take_pending_events() {
            self.relay.publish_domain_event(&event).await;
        }
    }

    async fn query_workers(&self, sql: &str, param: String) -> Result<Vec<WorkerAggregate>, CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let mut rows = conn.query(sql, params![param]).await.map_err(DbError::from)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(DbError::from)? {
            let document: String = row.get(0).map_err(DbError::from)?;
            out.push(row_to_worker(document)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl WorkerRepository for DbWorkerRepository {
    #[instrument(skip(self))]
    async fn get(&self, id: WorkerId) -> Result<Option<WorkerAggregate>, CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let mut rows = conn
            .query(sql::GET_WORKER_BY_ID, params![id.to_string()])
            .await
            .map_err(DbError::from)?;
        match rows.next().await.map_err(DbError::from)? {
            Some(row) => {
                let document: String = row.get(0).map_err(DbError::from)?;
                Ok(Some(row_to_worker(document)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, agg))]
    async fn add(&self, agg: &mut WorkerAggregate) -> Result<(), CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let document = serde_json::to_string(&agg).map_err(|e| DbError::MappingError(e.to_string()))?;
        conn.execute(
            sql::INSERT_WORKER,
            params![
                agg.id.to_string(),
                document,
                status_tag(agg.status),
                agg.region.clone(),
                agg.instance_id.clone(),
                agg.instance_type.clone(),
                agg.created_at.to_rfc3339(),
                agg.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(DbError::from)?;
        self.publish_pending(agg).await;
        Ok(())
    }

    #[instrument(skip(self, agg))]
    async fn update(&self, agg: &mut WorkerAggregate) -> Result<(), CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let document = serde_json::to_string(&agg).map_err(|e| DbError::MappingError(e.to_string()))?;
        let affected = conn
            .execute(
                sql::UPDATE_WORKER,
                params![
                    agg.id.to_string(),
                    document,
                    status_tag(agg.status),
                    agg.region.clone(),
                    agg.instance_id.clone(),
                    agg.instance_type.clone(),
                    agg.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(DbError::from)?;
        if affected == 0 {
            return Err(CoreError::from(DbError::WorkerNotFound));
        }
        self.publish_pending(agg).await;
        Ok(())
    }

    #[instrument(skip(self, aggs))]
    async fn update_many(&self, aggs: &mut [WorkerAggregate]) -> Result<(), CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let tx = conn.transaction().await.map_err(DbError::from)?;
        for agg in aggs.iter() {
            let document = serde_json::to_string(agg).map_err(|e| DbError::MappingError(e.to_string()))?;
            tx.execute(
                sql::UPDATE_WORKER,
                params![
                    agg.id.to_string(),
                    document,
                    status_tag(agg.status),
                    agg.region.clone(),
                    agg.instance_id.clone(),
                    agg.instance_type.clone(),
                    agg.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(DbError::from)?;
        }
        tx.commit().await.map_err(|_| DbError::TransactionError)?;
        for agg in aggs.iter_mut() {
            self.publish_pending(agg).await;
        }
        Ok(())
    }

    #[instrument(skip(self, agg))]
    async fn delete(&self, id: WorkerId, agg: Option<&mut WorkerAggregate>) -> Result<(), CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        conn.execute(sql::DELETE_WORKER, params![id.to_string()])
            .await
            .map_err(DbError::from)?;
        if let Some(agg) = agg {
            self.publish_pending(agg).await;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_by_cloud_instance_id(&self, instance_id: &str) -> Result<Option<WorkerAggregate>, CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let mut rows = conn
            .query(sql::GET_WORKER_BY_INSTANCE_ID, params![instance_id.to_string()])
            .await
            .map_err(DbError::from)?;
        match rows.next().await.map_err(DbError::from)? {
            Some(row) => {
                let document: String = row.get(0).map_err(DbError::from)?;
                Ok(Some(row_to_worker(document)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn get_by_status(&self, status: WorkerStatus) -> Result<Vec<WorkerAggregate>, CoreError> {
        self.query_workers(sql::GET_WORKERS_BY_STATUS, status_tag(status).to_string()).await
    }

    #[instrument(skip(self))]
    async fn get_active(&self) -> Result<Vec<WorkerAggregate>, CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let mut rows = conn.query(sql::GET_ACTIVE_WORKERS, ()).await.map_err(DbError::from)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(DbError::from)? {
            let document: String = row.get(0).map_err(DbError::from)?;
            out.push(row_to_worker(document)?);
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    async fn get_by_region(&self, region: &str) -> Result<Vec<WorkerAggregate>, CoreError> {
        self.query_workers(sql::GET_WORKERS_BY_REGION, region.to_string()).await
    }

    #[instrument(skip(self))]
    async fn get_idle(&self, threshold_minutes: i64) -> Result<Vec<WorkerAggregate>, CoreError> {
        let running = self.get_by_status(WorkerStatus::Running).await?;
        let now = Utc::now();
        let threshold = chrono::Duration::minutes(threshold_minutes);
        Ok(running
            .into_iter()
            .filter(|w| w.is_idle_detection_enabled)
            .filter(|w| {
                let reference = w.last_activity_at.unwrap_or(w.created_at);
                now - reference >= threshold
            })
            .collect())
    }
}
