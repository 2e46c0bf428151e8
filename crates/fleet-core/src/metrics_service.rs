//! [crates/fleet-core/src/metrics_service.rs]
//! Metrics Service: stateless orchestration that reconciles one
//! aggregate against the cloud provider. Does not persist — the caller
//! (typically a command handler) calls the repository afterwards.

use crate::clients::{CloudProvider, ClientError};
use chrono::{DateTime, Utc};
use fleet_domain::{WorkerAggregate, WorkerStatus};
use serde::Serialize;
use std::time::Duration;
use tracing::{instrument, warn};

#[derive(Debug, Clone, Serialize)]
pub struct MetricsResult {
    pub worker_id: String,
    pub status_updated: bool,
    pub cloud_state: Option<String>,
    pub cpu_utilization: Option<f64>,
    pub memory_utilization: Option<f64>,
    pub metrics_collected: bool,
    pub error: Option<String>,
}

impl MetricsResult {
    fn error(worker_id: &fleet_domain::WorkerId, message: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            status_updated: false,
            cloud_state: None,
            cpu_utilization: None,
            memory_utilization: None,
            metrics_collected: false,
            error: Some(message.into()),
        }
    }
}

const CLOUD_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MetricsService<'a> {
    pub cloud: &'a dyn CloudProvider,
}

impl<'a> MetricsService<'a> {
    pub fn new(cloud: &'a dyn CloudProvider) -> Self {
        Self { cloud }
    }

    #[instrument(skip(self, worker))]
    pub async fn refresh(
        &self,
        worker: &mut WorkerAggregate,
        collect_resource_metrics: bool,
        change_threshold_percent: f64,
        poll_interval: Option<u64>,
        now: DateTime<Utc>,
    ) -> MetricsResult {
        let Some(instance_id) = worker.instance_id.clone() else {
            return MetricsResult::error(&worker.id, "no instance");
        };

        if worker.status == WorkerStatus::Terminated {
            return MetricsResult {
                worker_id: worker.id.to_string(),
                status_updated: false,
                cloud_state: Some("terminated".to_string()),
                cpu_utilization: worker.cpu_utilization,
                memory_utilization: worker.memory_utilization,
                metrics_collected: false,
                error: None,
            };
        }

        let status = match tokio::time::timeout(
            CLOUD_CALL_TIMEOUT,
            self.cloud.describe_instance_status(&worker.region, &instance_id),
        )
        .await
        {
            Ok(Ok(Some(status))) => status,
            Ok(Ok(None)) => {
                // Upstream-not-found: the cloud instance is gone. This is not
                // a failure to propagate — force the local status to
                // Terminated and proceed.
                warn!(worker_id = %worker.id, instance_id, "cloud instance not found, forcing Terminated");
                let status_updated = worker.terminate("cloud-instance-not-found".into(), now);
                return MetricsResult {
                    worker_id: worker.id.to_string(),
                    status_updated,
                    cloud_state: Some("terminated".to_string()),
                    cpu_utilization: worker.cpu_utilization,
                    memory_utilization: worker.memory_utilization,
                    metrics_collected: false,
                    error: None,
                };
            }
            Ok(Err(err)) => return MetricsResult::error(&worker.id, err.to_string()),
            Err(_) => return MetricsResult::error(&worker.id, "timed out"),
        };

        worker.update_cloud_health(
            status.instance_status_check.clone(),
            status.system_status_check.clone(),
            now,
        );
        let new_status = WorkerAggregate::status_from_cloud_state(&status.state);
        let status_updated = worker.update_status(new_status, now);

        let mut cpu = worker.cpu_utilization;
        let mut memory = worker.memory_utilization;
        let mut metrics_collected = false;

        if new_status == WorkerStatus::Running && collect_resource_metrics {
            match tokio::time::timeout(
                CLOUD_CALL_TIMEOUT,
                self.cloud.get_metric_statistics(&worker.region, &instance_id),
            )
            .await
            {
                Ok(Ok(metrics)) => {
                    cpu = metrics.cpu_utilization;
                    memory = metrics.memory_utilization;
                    metrics_collected = cpu.is_some() || memory.is_some();
                }
                Ok(Err(ClientError::Transient(detail))) => {
                    warn!(worker_id = %worker.id, detail, "resource metrics unavailable, continuing with None");
                }
                Ok(Err(err)) => {
                    warn!(worker_id = %worker.id, error = %err, "resource metrics call failed, continuing with None");
                }
                Err(_) => {
                    warn!(worker_id = %worker.id, "resource metrics call timed out, continuing with None");
                }
            }
        }

        let next_refresh_at = poll_interval.map(|secs| now + chrono::Duration::seconds(secs as i64));
        worker.update_cloud_metrics(
            cpu,
            memory,
            status.monitoring_state.as_deref() == Some("enabled"),
            poll_interval,
            next_refresh_at,
            change_threshold_percent,
            now,
        );

        if let Ok(details) = self.cloud.describe_instance(&worker.region, &instance_id).await {
            let image_name = self
                .cloud
                .describe_image(&worker.region, &details.image_id)
                .await
                .ok()
                .and_then(|image| image.name);
            worker.update_instance_details(
                details.instance_type,
                details.image_id,
                image_name,
                details.public_ip,
                details.private_ip,
                now,
            );
            worker.update_cloud_tags(details.tags, now);
        }

        MetricsResult {
            worker_id: worker.id.to_string(),
            status_updated,
            cloud_state: Some(status.state),
            cpu_utilization: cpu,
            memory_utilization: memory,
            metrics_collected,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{running_worker, ClientErrorKind, StubCloudProvider};

    #[tokio::test]
    async fn no_instance_id_is_an_error_result() {
        let cloud = StubCloudProvider::new();
        let mut worker = running_worker("eu-west-1");
        worker.status = WorkerStatus::Pending;

        let result = MetricsService::new(&cloud)
            .refresh(&mut worker, false, 5.0, Some(60), Utc::now())
            .await;

        assert!(result.error.is_some());
        assert!(!result.status_updated);
    }

    #[tokio::test]
    async fn terminated_worker_short_circuits() {
        let cloud = StubCloudProvider::new();
        let instance_id = cloud.seed_instance("i-1", "eu-west-1", "running");
        let mut worker = running_worker("eu-west-1");
        worker.instance_id = Some(instance_id);
        worker.status = WorkerStatus::Terminated;

        let result = MetricsService::new(&cloud)
            .refresh(&mut worker, true, 5.0, Some(60), Utc::now())
            .await;

        assert_eq!(result.cloud_state.as_deref(), Some("terminated"));
        assert!(!result.metrics_collected);
    }

    #[tokio::test]
    async fn missing_cloud_instance_forces_local_terminated() {
        let cloud = StubCloudProvider::new();
        let mut worker = running_worker("eu-west-1");
        worker.instance_id = Some("i-gone".to_string());

        let result = MetricsService::new(&cloud)
            .refresh(&mut worker, false, 5.0, Some(60), Utc::now())
            .await;

        assert!(result.status_updated);
        assert_eq!(worker.status, WorkerStatus::Terminated);
        assert_eq!(result.cloud_state.as_deref(), Some("terminated"));
    }

    #[tokio::test]
    async fn running_worker_collects_resource_metrics_when_requested() {
        let cloud = StubCloudProvider::new();
        let instance_id = cloud.seed_instance("i-1", "eu-west-1", "running");
        let mut worker = running_worker("eu-west-1");
        worker.instance_id = Some(instance_id);

        let result = MetricsService::new(&cloud)
            .refresh(&mut worker, true, 5.0, Some(60), Utc::now())
            .await;

        assert!(result.metrics_collected);
        assert_eq!(result.cpu_utilization, Some(12.5));
        assert_eq!(worker.poll_interval, Some(60));
    }

    #[tokio::test]
    async fn transient_metrics_failure_degrades_gracefully() {
        let cloud = StubCloudProvider::new();
        let instance_id = cloud.seed_instance("i-1", "eu-west-1", "running");
        *cloud.metrics_error.lock().unwrap() = Some(ClientErrorKind::Transient);
        let mut worker = running_worker("eu-west-1");
        worker.instance_id = Some(instance_id);

        let result = MetricsService::new(&cloud)
            .refresh(&mut worker, true, 5.0, Some(60), Utc::now())
            .await;

        assert!(result.error.is_none());
        assert!(!result.metrics_collected);
        assert_eq!(result.cpu_utilization, None);
    }

    #[tokio::test]
    async fn stopped_worker_never_collects_resource_metrics() {
        let cloud = StubCloudProvider::new();
        let instance_id = cloud.seed_instance("i-1", "eu-west-1", "stopped");
        let mut worker = running_worker("eu-west-1");
        worker.instance_id = Some(instance_id);

        let result = MetricsService::new(&cloud)
            .refresh(&mut worker, true, 5.0, Some(60), Utc::now())
            .await;

        assert!(!result.metrics_collected);
        assert_eq!(worker.status, WorkerStatus::Stopped);
    }
}
