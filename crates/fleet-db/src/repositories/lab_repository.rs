//! [crates/fleet-db/src/repositories/lab_repository.rs]
//! `LabRecordRepository` adapter: one JSON document per `(worker_id, lab_id)`.
//! `LabRecord` carries no domain events of its own — it is not an aggregate
//! root — so this adapter has nothing to publish through the relay.

use super::lab_queries as sql;
use crate::errors::DbError;
use crate::DbClient;
use async_trait::async_trait;
use fleet_core::repositories::LabRecordRepository;
use fleet_core::result::CoreError;
use fleet_domain::{LabId, LabRecord, WorkerId};
use libsql::params;
use tracing::instrument;

fn row_to_record(document: String) -> Result<LabRecord, DbError> {
    serde_json::from_str(&document).map_err(|e| DbError::MappingError(e.to_string()))
}

pub struct DbLabRecordRepository {
    client: DbClient,
}

impl DbLabRecordRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LabRecordRepository for DbLabRecordRepository {
    #[instrument(skip(self))]
    async fn get(&self, worker_id: WorkerId, lab_id: &LabId) -> Result<Option<LabRecord>, CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let mut rows = conn
            .query(sql::GET_LAB_RECORD, params![worker_id.to_string(), lab_id.0.clone()])
            .await
            .map_err(DbError::from)?;
        match rows.next().await.map_err(DbError::from)? {
            Some(row) => {
                let document: String = row.get(0).map_err(DbError::from)?;
                Ok(Some(row_to_record(document)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn get_for_worker(&self, worker_id: WorkerId) -> Result<Vec<LabRecord>, CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let mut rows = conn
            .query(sql::GET_LAB_RECORDS_FOR_WORKER, params![worker_id.to_string()])
            .await
            .map_err(DbError::from)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(DbError::from)? {
            let document: String = row.get(0).map_err(DbError::from)?;
            out.push(row_to_record(document)?);
        }
        Ok(out)
    }

    #[instrument(skip(self, record))]
    async fn upsert(&self, record: &LabRecord) -> Result<(), CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let document = serde_json::to_string(record).map_err(|e| DbError::MappingError(e.to_string()))?;
        conn.execute(
            sql::UPSERT_LAB_RECORD,
            params![
                record.lab_id.0.clone(),
                record.worker_id.to_string(),
                document,
                format!("{:?}", record.state),
                record.title.clone(),
                record.last_synced_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    #[instrument(skip(self, records))]
    async fn upsert_many(&self, records: &[LabRecord]) -> Result<(), CoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let conn = self.client.connection().map_err(DbError::from)?;
        let tx = conn.transaction().await.map_err(DbError::from)?;
        for record in records {
            let document = serde_json::to_string(record).map_err(|e| DbError::MappingError(e.to_string()))?;
            tx.execute(
                sql::UPSERT_LAB_RECORD,
                params![
                    record.lab_id.0.clone(),
                    record.worker_id.to_string(),
                    document,
                    format!("{:?}", record.state),
                    record.title.clone(),
                    record.last_synced_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(DbError::from)?;
        }
        tx.commit().await.map_err(|_| DbError::TransactionError)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, worker_id: WorkerId, lab_id: &LabId) -> Result<(), CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        conn.execute(sql::DELETE_LAB_RECORD, params![worker_id.to_string(), lab_id.0.clone()])
            .await
            .map_err(DbError::from)?;
        Ok(())
    }
}
