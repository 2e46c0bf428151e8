//! [crates/fleet-core/src/commands/lab_control.rs]
//! ControlLab, ImportLab, DeleteLab, DownloadLab: proxy
//! operations to the lab HTTPS API, triggering a debounced labs refresh on
//! success so the local projection catches up.

use super::refresh::refresh_worker_labs;
use crate::context::Services;
use crate::result::CoreError;
use fleet_domain::WorkerId;
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabControlAction {
    Start,
    Stop,
    Wipe,
}

async fn endpoint_for(services: &Services, worker_id: WorkerId) -> Result<String, CoreError> {
    let worker = services
        .workers
        .get(worker_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("worker {worker_id} not found")))?;
    worker
        .https_endpoint
        .ok_or_else(|| CoreError::Precondition("worker has no endpoint".into()))
}

/// Triggers a labs refresh after a lab control/import/delete operation, gated
/// by the same per-worker refresh throttle the on-demand refresh decision
/// engine uses, so a burst of lab operations on one worker doesn't each force
/// a full resync. A refresh skipped by the debounce check is a silent no-op:
/// the next refresh (periodic or user-initiated) will catch the worker up.
async fn debounced_labs_refresh(services: &Services, worker_id: WorkerId) {
    if !services.throttle.can_refresh(worker_id) {
        return;
    }
    services.throttle.record(worker_id);
    let _ = refresh_worker_labs(services, worker_id).await;
}

#[instrument(skip(services))]
pub async fn control_lab(
    services: &Services,
    worker_id: WorkerId,
    lab_id: String,
    action: LabControlAction,
) -> Result<(), CoreError> {
    let endpoint = endpoint_for(services, worker_id).await?;
    let result = match action {
        LabControlAction::Start => services.lab_api.start_lab(&endpoint, &lab_id).await,
        LabControlAction::Stop => services.lab_api.stop_lab(&endpoint, &lab_id).await,
        LabControlAction::Wipe => services.lab_api.wipe_lab(&endpoint, &lab_id).await,
    };
    result.map_err(|e| CoreError::UpstreamOperation(e.to_string()))?;
    debounced_labs_refresh(services, worker_id).await;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ImportedLab {
    pub lab_id: String,
}

#[instrument(skip(services, topology_yaml))]
pub async fn import_lab(
    services: &Services,
    worker_id: WorkerId,
    title: String,
    topology_yaml: String,
) -> Result<ImportedLab, CoreError> {
    let endpoint = endpoint_for(services, worker_id).await?;
    let lab_id = services
        .lab_api
        .import_lab(&endpoint, &title, &topology_yaml)
        .await
        .map_err(|e| CoreError::UpstreamOperation(e.to_string()))?;
    debounced_labs_refresh(services, worker_id).await;
    Ok(ImportedLab { lab_id })
}

#[instrument(skip(services))]
pub async fn delete_lab(services: &Services, worker_id: WorkerId, lab_id: String) -> Result<(), CoreError> {
    let endpoint = endpoint_for(services, worker_id).await?;
    services
        .lab_api
        .delete_lab(&endpoint, &lab_id)
        .await
        .map_err(|e| CoreError::UpstreamOperation(e.to_string()))?;
    debounced_labs_refresh(services, worker_id).await;
    Ok(())
}

#[instrument(skip(services))]
pub async fn download_lab(services: &Services, worker_id: WorkerId, lab_id: String) -> Result<String, CoreError> {
    let endpoint = endpoint_for(services, worker_id).await?;
    services
        .lab_api
        .download_lab(&endpoint, &lab_id)
        .await
        .map_err(|e| CoreError::UpstreamOperation(e.to_string()))
}
