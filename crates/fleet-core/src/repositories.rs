//! [crates/fleet-core/src/repositories.rs]
//! Ports (in the hexagonal sense) the core depends on but does not implement.
//! `fleet-db` provides the libSQL-backed adapters; tests use in-memory fakes.
//! Defined as `async_trait` objects rather than concrete structs, so
//! command/query handlers can be exercised against fakes without a database
//! (see DESIGN.md).

use crate::result::CoreError;
use async_trait::async_trait;
use fleet_domain::{LabId, LabRecord, SystemSettings, WorkerAggregate, WorkerId, WorkerStatus};

#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn get(&self, id: WorkerId) -> Result<Option<WorkerAggregate>, CoreError>;
    async fn add(&self, agg: &mut WorkerAggregate) -> Result<(), CoreError>;
    async fn update(&self, agg: &mut WorkerAggregate) -> Result<(), CoreError>;
    async fn update_many(&self, aggs: &mut [WorkerAggregate]) -> Result<(), CoreError>;
    async fn delete(&self, id: WorkerId, agg: Option<&mut WorkerAggregate>) -> Result<(), CoreError>;
    async fn get_by_cloud_instance_id(&self, instance_id: &str) -> Result<Option<WorkerAggregate>, CoreError>;
    async fn get_by_status(&self, status: WorkerStatus) -> Result<Vec<WorkerAggregate>, CoreError>;
    async fn get_active(&self) -> Result<Vec<WorkerAggregate>, CoreError>;
    async fn get_by_region(&self, region: &str) -> Result<Vec<WorkerAggregate>, CoreError>;
    async fn get_idle(&self, threshold_minutes: i64) -> Result<Vec<WorkerAggregate>, CoreError>;
}

#[async_trait]
pub trait LabRecordRepository: Send + Sync {
    async fn get(&self, worker_id: WorkerId, lab_id: &LabId) -> Result<Option<LabRecord>, CoreError>;
    async fn get_for_worker(&self, worker_id: WorkerId) -> Result<Vec<LabRecord>, CoreError>;
    async fn upsert(&self, record: &LabRecord) -> Result<(), CoreError>;
    async fn upsert_many(&self, records: &[LabRecord]) -> Result<(), CoreError>;
    async fn delete(&self, worker_id: WorkerId, lab_id: &LabId) -> Result<(), CoreError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self) -> Result<SystemSettings, CoreError>;
    async fn update(&self, settings: &SystemSettings) -> Result<(), CoreError>;
}
