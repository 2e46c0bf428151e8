//! [crates/fleet-core/src/commands/worker_lifecycle.rs]
//! CreateWorker, ImportWorker, BulkImportWorkers, Start/StopWorker,
//! Terminate/DeleteWorker.

use crate::context::Services;
use crate::result::CoreError;
use chrono::Utc;
use fleet_domain::{WorkerAggregate, WorkerId, WorkerStatus};
use serde::Serialize;
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct CreatedWorker {
    pub worker_id: String,
}

#[instrument(skip(services))]
pub async fn create_worker(
    services: &Services,
    name: String,
    region: String,
    instance_type: Option<String>,
    image_id: Option<String>,
    created_by: String,
) -> Result<CreatedWorker, CoreError> {
    let settings = services.settings.get().await?;
    let instance_type = instance_type.unwrap_or(settings.worker_provisioning.default_instance_type);
    let image_id = image_id
        .or_else(|| Some(settings.worker_provisioning.default_image_id.clone()).filter(|s| !s.is_empty()))
        .ok_or_else(|| CoreError::Validation("no image configured for region".into()))?;

    let now = Utc::now();
    let mut worker = WorkerAggregate::create(WorkerId::new(), name, region, instance_type, image_id, created_by, now);
    services.workers.add(&mut worker).await?;

    let worker_id = worker.id;
    let cloud = services.cloud.clone();
    let region = worker.region.clone();
    let instance_type = worker.instance_type.clone();
    let image_id = worker.image_id.clone();
    let workers = services.workers.clone();
    tokio::spawn(async move {
        let tags = HashMap::from([("worker_id".to_string(), worker_id.to_string())]);
        if let Ok(instance_id) = cloud.create_instance(&region, &instance_type, &image_id, &tags).await {
            if let Ok(Some(mut worker)) = workers.get(worker_id).await {
                if worker.assign_instance(instance_id, None, None, Utc::now()).unwrap_or(false) {
                    let _ = workers.update(&mut worker).await;
                }
            }
        }
    });

    Ok(CreatedWorker {
        worker_id: worker_id.to_string(),
    })
}

#[instrument(skip(services))]
pub async fn import_worker(
    services: &Services,
    region: String,
    instance_id: Option<String>,
    image_id: Option<String>,
    image_name: Option<String>,
    name: Option<String>,
    created_by: String,
) -> Result<CreatedWorker, CoreError> {
    if instance_id.is_none() && image_id.is_none() && image_name.is_none() {
        return Err(CoreError::Validation("at least one lookup key is required".into()));
    }

    let resolved_instance_id = match instance_id {
        Some(id) => id,
        None => {
            let pattern = image_name.as_deref().unwrap_or_default();
            let candidates = services
                .cloud
                .list_instances_by_filters(&region, image_id.as_deref(), Some(pattern))
                .await
                .map_err(|e| CoreError::UpstreamOperation(e.to_string()))?;
            candidates
                .into_iter()
                .next()
                .ok_or_else(|| CoreError::NotFound("no matching cloud instance".into()))?
        }
    };

    if services.workers.get_by_cloud_instance_id(&resolved_instance_id).await?.is_some() {
        return Err(CoreError::Validation("instance already registered as a worker".into()));
    }

    let status = services
        .cloud
        .describe_instance_status(&region, &resolved_instance_id)
        .await
        .map_err(|e| CoreError::UpstreamOperation(e.to_string()))?
        .ok_or_else(|| CoreError::UpstreamNotFound(resolved_instance_id.clone()))?;
    let details = services
        .cloud
        .describe_instance(&region, &resolved_instance_id)
        .await
        .map_err(|e| CoreError::UpstreamOperation(e.to_string()))?;

    let now = Utc::now();
    let mut worker = WorkerAggregate::import_from_existing(
        WorkerId::new(),
        name.unwrap_or_else(|| resolved_instance_id.clone()),
        region,
        resolved_instance_id,
        details.instance_type,
        details.image_id,
        WorkerAggregate::status_from_cloud_state(&status.state),
        created_by,
        now,
    );
    worker.update_endpoint(None, details.public_ip, now);
    services.workers.add(&mut worker).await?;

    Ok(CreatedWorker {
        worker_id: worker.id.to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct SkippedImport {
    pub instance_id: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct BulkImportResult {
    pub total_found: usize,
    pub total_imported: usize,
    pub total_skipped: usize,
    pub skipped: Vec<SkippedImport>,
}

#[instrument(skip(services))]
pub async fn bulk_import_workers(
    services: &Services,
    region: String,
    image_id: Option<String>,
    image_name: Option<String>,
    created_by: String,
) -> Result<BulkImportResult, CoreError> {
    if image_id.is_none() && image_name.is_none() {
        return Err(CoreError::Validation("at least one lookup key is required".into()));
    }

    let instance_ids = services
        .cloud
        .list_instances_by_filters(&region, image_id.as_deref(), image_name.as_deref())
        .await
        .map_err(|e| CoreError::UpstreamOperation(e.to_string()))?;

    let mut skipped = Vec::new();
    let mut imported = 0usize;

    for instance_id in &instance_ids {
        if let Some(mut existing) = services.workers.get_by_cloud_instance_id(instance_id).await? {
            reconcile_shutdown_disagreement(services, &mut existing).await?;
            skipped.push(SkippedImport {
                instance_id: instance_id.clone(),
                reason: "Already registered as CML Worker".to_string(),
            });
            continue;
        }

        match import_worker(
            services,
            region.clone(),
            Some(instance_id.clone()),
            image_id.clone(),
            image_name.clone(),
            None,
            created_by.clone(),
        )
        .await
        {
            Ok(_) => imported += 1,
            Err(err) => skipped.push(SkippedImport {
                instance_id: instance_id.clone(),
                reason: err.to_string(),
            }),
        }
    }

    Ok(BulkImportResult {
        total_found: instance_ids.len(),
        total_imported: imported,
        total_skipped: skipped.len(),
        skipped,
    })
}

async fn reconcile_shutdown_disagreement(services: &Services, worker: &mut WorkerAggregate) -> Result<(), CoreError> {
    let Some(instance_id) = worker.instance_id.clone() else {
        return Ok(());
    };
    if let Ok(Some(status)) = services.cloud.describe_instance_status(&worker.region, &instance_id).await {
        let cloud_status = WorkerAggregate::status_from_cloud_state(&status.state);
        let disagrees_on_termination = matches!(cloud_status, WorkerStatus::Terminated)
            && worker.status != WorkerStatus::Terminated;
        if disagrees_on_termination && worker.update_status(cloud_status, Utc::now()) {
            services.workers.update(worker).await?;
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct TransitionResult {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub already_in_target_state: bool,
}

#[instrument(skip(services))]
pub async fn start_worker(services: &Services, worker_id: WorkerId, requested_by: String) -> Result<TransitionResult, CoreError> {
    let mut worker = load_worker(services, worker_id).await?;
    if worker.status == WorkerStatus::Running {
        return Ok(TransitionResult {
            worker_id: worker_id.to_string(),
            status: worker.status,
            already_in_target_state: true,
        });
    }
    let Some(instance_id) = worker.instance_id.clone() else {
        return Err(CoreError::Precondition("worker has no cloud instance".into()));
    };
    services
        .cloud
        .start_instance(&worker.region, &instance_id)
        .await
        .map_err(|e| CoreError::UpstreamOperation(e.to_string()))?;
    let now = Utc::now();
    worker.resume("manual start".into(), requested_by, false, now);
    worker.update_status(WorkerStatus::Running, now);
    services.workers.update(&mut worker).await?;
    Ok(TransitionResult {
        worker_id: worker_id.to_string(),
        status: worker.status,
        already_in_target_state: false,
    })
}

#[instrument(skip(services))]
pub async fn stop_worker(services: &Services, worker_id: WorkerId, requested_by: String) -> Result<TransitionResult, CoreError> {
    let mut worker = load_worker(services, worker_id).await?;
    if worker.status == WorkerStatus::Stopped {
        return Ok(TransitionResult {
            worker_id: worker_id.to_string(),
            status: worker.status,
            already_in_target_state: true,
        });
    }
    let Some(instance_id) = worker.instance_id.clone() else {
        return Err(CoreError::Precondition("worker has no cloud instance".into()));
    };
    services
        .cloud
        .stop_instance(&worker.region, &instance_id)
        .await
        .map_err(|e| CoreError::UpstreamOperation(e.to_string()))?;
    let now = Utc::now();
    worker.pause("manual stop".into(), requested_by, false, now);
    worker.update_status(WorkerStatus::Stopped, now);
    services.workers.update(&mut worker).await?;
    Ok(TransitionResult {
        worker_id: worker_id.to_string(),
        status: worker.status,
        already_in_target_state: false,
    })
}

#[instrument(skip(services))]
pub async fn terminate_worker(
    services: &Services,
    worker_id: WorkerId,
    terminated_by: String,
) -> Result<TransitionResult, CoreError> {
    let mut worker = load_worker(services, worker_id).await?;
    if let Some(instance_id) = worker.instance_id.clone() {
        if let Err(err) = services.cloud.terminate_instance(&worker.region, &instance_id).await {
            tracing::warn!(worker_id = %worker_id, error = %err, "cloud termination failed, proceeding locally");
        }
    }
    worker.terminate(terminated_by, Utc::now());
    services.workers.update(&mut worker).await?;
    Ok(TransitionResult {
        worker_id: worker_id.to_string(),
        status: worker.status,
        already_in_target_state: false,
    })
}

#[instrument(skip(services))]
pub async fn delete_worker(
    services: &Services,
    worker_id: WorkerId,
    terminate_instance: bool,
    terminated_by: String,
) -> Result<(), CoreError> {
    let mut worker = load_worker(services, worker_id).await?;
    if terminate_instance {
        if let Some(instance_id) = worker.instance_id.clone() {
            if let Err(err) = services.cloud.terminate_instance(&worker.region, &instance_id).await {
                tracing::warn!(worker_id = %worker_id, error = %err, "cloud termination failed, proceeding with delete");
            }
        }
    }
    worker.terminate(terminated_by, Utc::now());
    services.workers.delete(worker_id, Some(&mut worker)).await?;
    Ok(())
}

async fn load_worker(services: &Services, worker_id: WorkerId) -> Result<WorkerAggregate, CoreError> {
    services
        .workers
        .get(worker_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("worker {worker_id} not found")))
}
