//! [crates/fleet-core/src/commands/idle_toggle.rs]
//! EnableIdleDetection / DisableIdleDetection: idempotent flag
//! toggles on the aggregate.

use crate::context::Services;
use crate::result::CoreError;
use fleet_domain::WorkerId;
use tracing::instrument;

#[instrument(skip(services))]
pub async fn enable_idle_detection(services: &Services, worker_id: WorkerId) -> Result<(), CoreError> {
    set_idle_detection(services, worker_id, true).await
}

#[instrument(skip(services))]
pub async fn disable_idle_detection(services: &Services, worker_id: WorkerId) -> Result<(), CoreError> {
    set_idle_detection(services, worker_id, false).await
}

async fn set_idle_detection(services: &Services, worker_id: WorkerId, enabled: bool) -> Result<(), CoreError> {
    let mut worker = services
        .workers
        .get(worker_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("worker {worker_id} not found")))?;
    if worker.set_idle_detection(enabled) {
        services.workers.update(&mut worker).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{running_worker, test_services};
    use fleet_domain::WorkerStatus;

    #[tokio::test]
    async fn disabling_then_reenabling_round_trips() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        services.workers.add(&mut worker).await.unwrap();
        assert!(worker.is_idle_detection_enabled);

        disable_idle_detection(&services, worker.id).await.unwrap();
        let reloaded = services.workers.get(worker.id).await.unwrap().unwrap();
        assert!(!reloaded.is_idle_detection_enabled);

        enable_idle_detection(&services, worker.id).await.unwrap();
        let reloaded = services.workers.get(worker.id).await.unwrap().unwrap();
        assert!(reloaded.is_idle_detection_enabled);
    }

    #[tokio::test]
    async fn enabling_when_already_enabled_is_a_no_op_write() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        services.workers.add(&mut worker).await.unwrap();

        // Already enabled by default; this must not error even though no
        // update is persisted.
        enable_idle_detection(&services, worker.id).await.unwrap();
        let reloaded = services.workers.get(worker.id).await.unwrap().unwrap();
        assert!(reloaded.is_idle_detection_enabled);
    }

    #[tokio::test]
    async fn terminated_workers_ignore_the_toggle() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        worker.status = WorkerStatus::Terminated;
        services.workers.add(&mut worker).await.unwrap();

        disable_idle_detection(&services, worker.id).await.unwrap();
        let reloaded = services.workers.get(worker.id).await.unwrap().unwrap();
        assert!(reloaded.is_idle_detection_enabled);
    }

    #[tokio::test]
    async fn missing_worker_is_not_found() {
        let services = test_services();
        let result = enable_idle_detection(&services, fleet_domain::WorkerId::new()).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
