//! [crates/fleet-core/src/commands/bulk_sync.rs]
//! BulkSyncWorkerCmlData / BulkSyncWorkerEc2Status: concurrently
//! invoke the single-worker equivalent, bounded by a semaphore, and never fail
//! the whole batch because one worker failed.

use super::refresh::{refresh_worker_labs, refresh_worker_metrics};
use crate::context::Services;
use crate::result::CoreError;
use fleet_domain::WorkerId;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::instrument;

const DEFAULT_MAX_CONCURRENT: usize = 10;

#[derive(Debug, Serialize)]
pub struct SyncFailure {
    pub worker_id: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct BulkSyncResult {
    pub synced: Vec<String>,
    pub failed: Vec<SyncFailure>,
}

async fn target_worker_ids(services: &Services, worker_ids: Option<Vec<WorkerId>>) -> Result<Vec<WorkerId>, CoreError> {
    match worker_ids {
        Some(ids) => Ok(ids),
        None => Ok(services.workers.get_active().await?.into_iter().map(|w| w.id).collect()),
    }
}

#[instrument(skip(services))]
pub async fn bulk_sync_worker_cml_data(
    services: &Services,
    worker_ids: Option<Vec<WorkerId>>,
    max_concurrent: Option<usize>,
) -> Result<BulkSyncResult, CoreError> {
    let targets = target_worker_ids(services, worker_ids).await?;
    let semaphore = Arc::new(Semaphore::new(max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT)));

    let tasks = targets.into_iter().map(|worker_id| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            match refresh_worker_labs(services, worker_id).await {
                Ok(_) => Ok(worker_id.to_string()),
                Err(err) => Err(SyncFailure {
                    worker_id: worker_id.to_string(),
                    reason: err.to_string(),
                }),
            }
        }
    });

    let results = futures::future::join_all(tasks).await;
    Ok(partition(results))
}

#[instrument(skip(services))]
pub async fn bulk_sync_worker_ec2_status(
    services: &Services,
    worker_ids: Option<Vec<WorkerId>>,
    max_concurrent: Option<usize>,
) -> Result<BulkSyncResult, CoreError> {
    let targets = target_worker_ids(services, worker_ids).await?;
    let semaphore = Arc::new(Semaphore::new(max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT)));

    let tasks = targets.into_iter().map(|worker_id| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            match refresh_worker_metrics(services, worker_id, true).await {
                Ok(result) if result.error.is_none() => Ok(worker_id.to_string()),
                Ok(result) => Err(SyncFailure {
                    worker_id: worker_id.to_string(),
                    reason: result.error.unwrap_or_default(),
                }),
                Err(err) => Err(SyncFailure {
                    worker_id: worker_id.to_string(),
                    reason: err.to_string(),
                }),
            }
        }
    });

    let results = futures::future::join_all(tasks).await;
    Ok(partition(results))
}

fn partition(results: Vec<Result<String, SyncFailure>>) -> BulkSyncResult {
    let mut synced = Vec::new();
    let mut failed = Vec::new();
    for result in results {
        match result {
            Ok(id) => synced.push(id),
            Err(failure) => failed.push(failure),
        }
    }
    BulkSyncResult { synced, failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{running_worker, test_services};

    #[tokio::test]
    async fn cml_sync_fails_workers_without_an_endpoint_but_keeps_going() {
        let services = test_services();
        let mut with_endpoint = running_worker("eu-west-1");
        with_endpoint.https_endpoint = Some("https://203.0.113.10".to_string());
        services.workers.add(&mut with_endpoint).await.unwrap();

        let mut without_endpoint = running_worker("eu-west-1");
        services.workers.add(&mut without_endpoint).await.unwrap();

        let result = bulk_sync_worker_cml_data(&services, None, None).await.unwrap();
        assert_eq!(result.synced, vec![with_endpoint.id.to_string()]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].worker_id, without_endpoint.id.to_string());
    }

    #[tokio::test]
    async fn explicit_worker_ids_are_respected_over_the_active_set() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        services.workers.add(&mut worker).await.unwrap();
        let mut other = running_worker("eu-west-1");
        services.workers.add(&mut other).await.unwrap();

        let result = bulk_sync_worker_ec2_status(&services, Some(vec![worker.id]), None).await.unwrap();
        assert_eq!(result.synced.len() + result.failed.len(), 1);
    }

    #[tokio::test]
    async fn ec2_status_sync_reports_the_metrics_error_as_a_failure() {
        let services = test_services();
        // No instance assigned: MetricsService::refresh reports an error string
        // rather than returning Err, which bulk_sync must still surface as a failure.
        let mut worker = running_worker("eu-west-1");
        services.workers.add(&mut worker).await.unwrap();

        let result = bulk_sync_worker_ec2_status(&services, None, None).await.unwrap();
        assert!(result.synced.is_empty());
        assert_eq!(result.failed.len(), 1);
    }
}
