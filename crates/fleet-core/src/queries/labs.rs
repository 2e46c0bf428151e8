//! [crates/fleet-core/src/queries/labs.rs]
//! GetWorkerLabs: cached from `LabRecord`, read-only.

use crate::context::Services;
use crate::result::CoreError;
use fleet_domain::{LabRecord, WorkerId};
use tracing::instrument;

#[instrument(skip(services))]
pub async fn get_worker_labs(services: &Services, worker_id: WorkerId) -> Result<Vec<LabRecord>, CoreError> {
    services.workers.get(worker_id).await?.ok_or_else(|| CoreError::NotFound(format!("worker {worker_id} not found")))?;
    services.labs.get_for_worker(worker_id).await
}
