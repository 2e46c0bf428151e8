//! [crates/fleet-core/src/queries/workers.rs]
//! GetCMLWorkersByRegion, GetCMLWorkerById. Read-only.

use crate::context::Services;
use crate::result::CoreError;
use fleet_domain::{WorkerAggregate, WorkerId, WorkerStatus};
use serde::Serialize;
use std::str::FromStr;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct WorkerSummary {
    pub id: String,
    pub name: String,
    pub region: String,
    pub status: WorkerStatus,
    pub instance_id: Option<String>,
    /// Prefers lab-service-derived utilization over cloud telemetry, clamped
    /// to [0, 100].
    pub derived_cpu_utilization: Option<f64>,
}

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn derive_utilization(worker: &WorkerAggregate) -> Option<f64> {
    worker
        .lab_metrics
        .system_info
        .as_ref()
        .and_then(|v| v.get("cpu_utilization"))
        .and_then(|v| v.as_f64())
        .or(worker.cpu_utilization)
        .map(clamp_percent)
}

fn to_summary(worker: WorkerAggregate) -> WorkerSummary {
    WorkerSummary {
        id: worker.id.to_string(),
        name: worker.name.clone(),
        region: worker.region.clone(),
        status: worker.status,
        instance_id: worker.instance_id.clone(),
        derived_cpu_utilization: derive_utilization(&worker),
    }
}

#[instrument(skip(services))]
pub async fn get_workers_by_region(
    services: &Services,
    region: String,
    status: Option<WorkerStatus>,
) -> Result<Vec<WorkerSummary>, CoreError> {
    let workers = services.workers.get_by_region(&region).await?;
    Ok(workers
        .into_iter()
        .filter(|w| status.map(|s| w.status == s).unwrap_or(true))
        .map(to_summary)
        .collect())
}

/// Accepts either a worker id or a cloud instance id, per the
/// `worker_id ∨ instance_id` lookup key.
#[instrument(skip(services))]
pub async fn get_worker_by_id(services: &Services, identifier: &str) -> Result<WorkerSummary, CoreError> {
    let worker = if let Ok(id) = WorkerId::from_str(identifier) {
        services.workers.get(id).await?
    } else {
        None
    };
    let worker = match worker {
        Some(w) => w,
        None => services
            .workers
            .get_by_cloud_instance_id(identifier)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("worker {identifier} not found")))?,
    };
    Ok(to_summary(worker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{running_worker, test_services};
    use serde_json::json;

    #[tokio::test]
    async fn region_filter_only_returns_matching_workers() {
        let services = test_services();
        let mut eu_worker = running_worker("eu-west-1");
        services.workers.add(&mut eu_worker).await.unwrap();
        let mut us_worker = running_worker("us-east-1");
        services.workers.add(&mut us_worker).await.unwrap();

        let summaries = get_workers_by_region(&services, "eu-west-1".into(), None).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, eu_worker.id.to_string());
    }

    #[tokio::test]
    async fn status_filter_narrows_the_region_results() {
        let services = test_services();
        let mut running = running_worker("eu-west-1");
        services.workers.add(&mut running).await.unwrap();
        let mut stopped = running_worker("eu-west-1");
        stopped.status = WorkerStatus::Stopped;
        services.workers.add(&mut stopped).await.unwrap();

        let summaries = get_workers_by_region(&services, "eu-west-1".into(), Some(WorkerStatus::Stopped))
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, stopped.id.to_string());
    }

    #[tokio::test]
    async fn lab_service_utilization_is_preferred_over_cloud_telemetry() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        worker.cpu_utilization = Some(10.0);
        worker.lab_metrics.system_info = Some(json!({ "cpu_utilization": 250.0 }));
        services.workers.add(&mut worker).await.unwrap();

        let summary = get_worker_by_id(&services, &worker.id.to_string()).await.unwrap();
        // Clamped to 100 even though the lab-service reading was out of range.
        assert_eq!(summary.derived_cpu_utilization, Some(100.0));
    }

    #[tokio::test]
    async fn falls_back_to_cloud_telemetry_when_lab_service_has_no_reading() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        worker.cpu_utilization = Some(42.0);
        services.workers.add(&mut worker).await.unwrap();

        let summary = get_worker_by_id(&services, &worker.id.to_string()).await.unwrap();
        assert_eq!(summary.derived_cpu_utilization, Some(42.0));
    }

    #[tokio::test]
    async fn lookup_by_cloud_instance_id_falls_back_when_not_a_worker_id() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        worker.instance_id = Some("i-abc123".to_string());
        services.workers.add(&mut worker).await.unwrap();

        let summary = get_worker_by_id(&services, "i-abc123").await.unwrap();
        assert_eq!(summary.id, worker.id.to_string());
    }

    #[tokio::test]
    async fn unknown_identifier_is_not_found() {
        let services = test_services();
        let result = get_worker_by_id(&services, "does-not-exist").await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
