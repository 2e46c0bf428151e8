//! [crates/fleet-core/src/commands/refresh.rs]
//! RefreshWorkerMetrics, RefreshWorkerLabs and the RequestWorkerDataRefresh
//! decision engine.

use crate::context::Services;
use crate::metrics_service::{MetricsResult, MetricsService};
use crate::result::CoreError;
use crate::scheduler::job_store::{enqueue_one_shot_idempotent, EnqueueOutcome};
use crate::scheduler::jobs::{JobKind, ScheduledJob};
use chrono::Utc;
use fleet_domain::{DomainEvent, LabId, LabRecord, LabState, WorkerId, WorkerStatus};
use serde::Serialize;
use tracing::instrument;

#[instrument(skip(services))]
pub async fn refresh_worker_metrics(
    services: &Services,
    worker_id: WorkerId,
    collect_resource_metrics: bool,
) -> Result<MetricsResult, CoreError> {
    let mut worker = services
        .workers
        .get(worker_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("worker {worker_id} not found")))?;

    let settings = services.settings.get().await?;
    let now = Utc::now();
    let metrics_service = MetricsService::new(services.cloud.as_ref());
    let result = metrics_service
        .refresh(
            &mut worker,
            collect_resource_metrics,
            settings.monitoring.change_threshold_percent,
            Some(settings.monitoring.cloud_metrics_poll_interval_seconds),
            now,
        )
        .await;

    services.workers.update(&mut worker).await?;

    if worker.status == WorkerStatus::Running && worker.lab_metrics.ready {
        let _ = refresh_worker_labs(services, worker_id).await;
    }

    Ok(result)
}

#[derive(Debug, Serialize)]
pub struct LabsRefreshResult {
    pub synced: usize,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

#[instrument(skip(services))]
pub async fn refresh_worker_labs(services: &Services, worker_id: WorkerId) -> Result<LabsRefreshResult, CoreError> {
    let worker = services
        .workers
        .get(worker_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("worker {worker_id} not found")))?;
    let endpoint = worker
        .https_endpoint
        .clone()
        .ok_or_else(|| CoreError::Precondition("worker has no endpoint".into()))?;

    let remote_labs = services
        .lab_api
        .list_labs(&endpoint)
        .await
        .map_err(|e| CoreError::UpstreamOperation(e.to_string()))?;
    let remote_ids: std::collections::HashSet<String> = remote_labs.iter().map(|l| l.id.clone()).collect();

    let existing = services.labs.get_for_worker(worker_id).await?;
    let mut removed = 0usize;
    for record in &existing {
        if !remote_ids.contains(&record.lab_id.0) {
            services.labs.delete(worker_id, &record.lab_id).await?;
            removed += 1;
        }
    }

    let mut created = 0usize;
    let mut updated = 0usize;
    let mut touched = Vec::new();
    let mut lab_events = Vec::new();

    for summary in &remote_labs {
        let details = match services.lab_api.get_lab(&endpoint, &summary.id).await {
            Ok(details) => details,
            Err(err) => {
                tracing::warn!(worker_id = %worker_id, lab_id = %summary.id, error = %err, "per-lab sync failed, continuing");
                continue;
            }
        };
        let lab_id = LabId::from(details.id.clone());
        let now = Utc::now();
        match existing.iter().find(|r| r.lab_id == lab_id) {
            Some(found) => {
                let mut record = found.clone();
                let previous_state = record.state;
                let new_state = LabState::from_lab_service_state(&details.state);
                let changed_fields = record.apply_sync(
                    details.title,
                    details.description,
                    details.notes,
                    new_state,
                    details.owner_username,
                    details.owner_full_name,
                    details.node_count,
                    details.link_count,
                    details.groups,
                    details.modified_at,
                    now,
                );
                if previous_state != new_state {
                    lab_events.push(DomainEvent::LabStateChanged {
                        worker_id,
                        lab_id: record.lab_id.clone(),
                        previous_state,
                        new_state,
                        at: now,
                    });
                }
                if !changed_fields.is_empty() {
                    lab_events.push(DomainEvent::LabRecordUpdated {
                        worker_id,
                        lab_id: record.lab_id.clone(),
                        changed_fields,
                        at: now,
                    });
                }
                touched.push(record);
                updated += 1;
            }
            None => {
                let record = LabRecord::new(
                    lab_id,
                    worker_id,
                    details.title,
                    LabState::from_lab_service_state(&details.state),
                    now,
                );
                lab_events.push(DomainEvent::LabRecordCreated {
                    worker_id,
                    lab_id: record.lab_id.clone(),
                    at: now,
                });
                touched.push(record);
                created += 1;
            }
        }
    }

    // Batch writes, falling back to per-row upsert if the batch fails on a
    // duplicate-key race against a concurrent refresh of the same worker.
    if services.labs.upsert_many(&touched).await.is_err() {
        for record in &touched {
            let _ = services.labs.upsert(record).await;
        }
    }

    for event in &lab_events {
        services.relay.publish_domain_event(event).await;
    }

    Ok(LabsRefreshResult {
        synced: touched.len(),
        created,
        updated,
        removed,
    })
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RefreshDecision {
    Scheduled {
        scheduled: bool,
        job_id: String,
        eta_seconds: u64,
    },
    Skipped {
        scheduled: bool,
        reason: String,
        retry_after_seconds: Option<u64>,
        seconds_until_background_job: Option<i64>,
    },
}

#[instrument(skip(services))]
pub async fn request_worker_data_refresh(services: &Services, worker_id: WorkerId) -> Result<RefreshDecision, CoreError> {
    let mut worker = services
        .workers
        .get(worker_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("worker {worker_id} not found")))?;

    let now = Utc::now();

    if worker.status != WorkerStatus::Running {
        worker.skip_data_refresh("not_running".into(), None, now);
        services.workers.update(&mut worker).await?;
        return Ok(RefreshDecision::Skipped {
            scheduled: false,
            reason: "not_running".into(),
            retry_after_seconds: None,
            seconds_until_background_job: None,
        });
    }

    if !services.throttle.can_refresh(worker_id) {
        let retry_after = services.throttle.time_until_next(worker_id).as_secs();
        worker.skip_data_refresh("rate_limited".into(), Some(retry_after), now);
        services.workers.update(&mut worker).await?;
        return Ok(RefreshDecision::Skipped {
            scheduled: false,
            reason: "rate_limited".into(),
            retry_after_seconds: Some(retry_after),
            seconds_until_background_job: None,
        });
    }

    let settings = services.settings.get().await?;
    if let Some(fleet_job) = services.jobs.get(&JobKind::FleetMetrics.name()).await? {
        let seconds_until = (fleet_job.run_at - now).num_seconds();
        if seconds_until >= 0
            && seconds_until as u64 <= settings.monitoring.background_job_imminent_threshold_seconds
        {
            worker.skip_data_refresh("background_job_imminent".into(), None, now);
            services.workers.update(&mut worker).await?;
            return Ok(RefreshDecision::Skipped {
                scheduled: false,
                reason: "background_job_imminent".into(),
                retry_after_seconds: None,
                seconds_until_background_job: Some(seconds_until),
            });
        }
    }

    let job = ScheduledJob::one_shot(
        JobKind::OnDemandRefresh {
            worker_id: worker_id.to_string(),
        },
        now + chrono::Duration::seconds(1),
    );
    let job_id = job.id.clone();
    match enqueue_one_shot_idempotent(services.jobs.as_ref(), job, now).await? {
        EnqueueOutcome::AlreadyScheduled => {
            worker.skip_data_refresh("already_scheduled".into(), None, now);
            services.workers.update(&mut worker).await?;
            Ok(RefreshDecision::Skipped {
                scheduled: false,
                reason: "already_scheduled".into(),
                retry_after_seconds: None,
                seconds_until_background_job: None,
            })
        }
        EnqueueOutcome::Enqueued => {
            services.throttle.record(worker_id);
            worker.request_data_refresh(now, "user".into());
            services.workers.update(&mut worker).await?;
            Ok(RefreshDecision::Scheduled {
                scheduled: true,
                job_id,
                eta_seconds: 1,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{running_worker, seeded_lab_details, test_services, test_services_with, StubCloudProvider, StubLabApiClient};
    use std::sync::Arc;

    #[tokio::test]
    async fn non_running_worker_is_skipped() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        worker.status = WorkerStatus::Stopped;
        let worker_id = services.workers.add(&mut worker).await.map(|_| worker.id).unwrap();

        let decision = request_worker_data_refresh(&services, worker_id).await.unwrap();
        match decision {
            RefreshDecision::Skipped { reason, scheduled, .. } => {
                assert_eq!(reason, "not_running");
                assert!(!scheduled);
            }
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn throttled_worker_is_rate_limited() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        services.workers.add(&mut worker).await.unwrap();
        services.throttle.record(worker.id);

        let decision = request_worker_data_refresh(&services, worker.id).await.unwrap();
        match decision {
            RefreshDecision::Skipped {
                reason,
                retry_after_seconds,
                ..
            } => {
                assert_eq!(reason, "rate_limited");
                assert!(retry_after_seconds.unwrap() > 0);
            }
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn imminent_background_job_is_skipped() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        services.workers.add(&mut worker).await.unwrap();

        let now = Utc::now();
        let fleet_job = ScheduledJob::recurrent(JobKind::FleetMetrics, 300, now + chrono::Duration::seconds(5));
        services.jobs.upsert(&fleet_job).await.unwrap();

        let decision = request_worker_data_refresh(&services, worker.id).await.unwrap();
        match decision {
            RefreshDecision::Skipped {
                reason,
                seconds_until_background_job,
                ..
            } => {
                assert_eq!(reason, "background_job_imminent");
                assert!(seconds_until_background_job.unwrap() <= 10);
            }
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn happy_path_schedules_a_one_shot_job() {
        let services = test_services();
        let mut worker = running_worker("eu-west-1");
        services.workers.add(&mut worker).await.unwrap();

        let decision = request_worker_data_refresh(&services, worker.id).await.unwrap();
        match decision {
            RefreshDecision::Scheduled { scheduled, job_id, .. } => {
                assert!(scheduled);
                assert!(job_id.contains(&worker.id.to_string()));
            }
            other => panic!("expected Scheduled, got {other:?}"),
        }
        assert!(!services.throttle.can_refresh(worker.id));

        // A second call inside the dedup window finds the job already scheduled.
        let second = request_worker_data_refresh(&services, worker.id).await.unwrap();
        assert!(matches!(
            second,
            RefreshDecision::Skipped { reason, .. } if reason == "already_scheduled" || reason == "rate_limited"
        ));
    }

    #[tokio::test]
    async fn refresh_worker_labs_creates_updates_and_removes_orphans() {
        let lab_api = Arc::new(StubLabApiClient::new());
        lab_api.seed_lab(seeded_lab_details("lab-1", "Lab One", "STARTED"));
        lab_api.seed_lab(seeded_lab_details("lab-2", "Lab Two", "BOOTED"));
        let services = test_services_with(Arc::new(StubCloudProvider::new()), lab_api);

        let mut worker = running_worker("eu-west-1");
        worker.https_endpoint = Some("https://203.0.113.10".to_string());
        services.workers.add(&mut worker).await.unwrap();

        // An orphaned record the remote side no longer reports.
        let orphan = LabRecord::new(LabId::from("lab-orphan"), worker.id, "gone".into(), LabState::Started, Utc::now());
        services.labs.upsert(&orphan).await.unwrap();

        // One lab the remote side still reports, already known locally.
        let existing = LabRecord::new(LabId::from("lab-1"), worker.id, "Lab One".into(), LabState::Defined, Utc::now());
        services.labs.upsert(&existing).await.unwrap();

        let result = refresh_worker_labs(&services, worker.id).await.unwrap();
        assert_eq!(result.created, 1);
        assert_eq!(result.updated, 1);
        assert_eq!(result.removed, 1);

        let remaining = services.labs.get_for_worker(worker.id).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|r| r.lab_id.0 != "lab-orphan"));
    }

    #[tokio::test]
    async fn refresh_worker_labs_publishes_create_and_state_change_events() {
        use crate::relay::SubscriptionFilter;

        let lab_api = Arc::new(StubLabApiClient::new());
        lab_api.seed_lab(seeded_lab_details("lab-1", "Lab One", "STARTED"));
        let services = test_services_with(Arc::new(StubCloudProvider::new()), lab_api);

        let mut worker = running_worker("eu-west-1");
        worker.https_endpoint = Some("https://203.0.113.10".to_string());
        services.workers.add(&mut worker).await.unwrap();

        // Already known locally in a different state, so the sync should also
        // report a state change alongside the field update.
        let existing = LabRecord::new(LabId::from("lab-1"), worker.id, "Lab One".into(), LabState::Defined, Utc::now());
        services.labs.upsert(&existing).await.unwrap();

        services.relay.clone().spawn_listener().await.unwrap();
        let (_id, mut rx) = services.relay.subscribe(SubscriptionFilter::default());
        refresh_worker_labs(&services, worker.id).await.unwrap();

        let mut seen_types = Vec::new();
        while let Ok(Some(envelope)) = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await {
            seen_types.push(envelope.event_type);
        }
        assert!(seen_types.contains(&"lab.state.changed".to_string()));
        assert!(seen_types.contains(&"lab.record.updated".to_string()));
    }
}
