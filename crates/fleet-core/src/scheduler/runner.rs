//! [crates/fleet-core/src/scheduler/runner.rs]
//! Dispatch loop: ticks on an interval, pulls due jobs from the store,
//! resolves each by its `JobKind` tag and executes it. A single
//! `tokio::time::interval` loop spawned once at startup, dispatching by job
//! tag rather than running one fixed routine, backed by a persistent store
//! instead of living only in process memory.

use super::job_store::JobStore;
use super::jobs::{JobKind, JobStatus, ScheduledJob};
use crate::commands::refresh::{refresh_worker_labs, refresh_worker_metrics};
use crate::commands::worker_lifecycle::bulk_import_workers;
use crate::context::Services;
use crate::idle;
use chrono::Utc;
use fleet_domain::{WorkerId, WorkerStatus};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

/// How often the dispatcher polls the job store for due work.
const DISPATCH_TICK: Duration = Duration::from_secs(1);

const FLEET_METRICS_CONCURRENCY: usize = 10;
const ACTIVITY_DETECTION_CONCURRENCY: usize = 5;

pub struct JobRunner {
    services: Services,
}

impl JobRunner {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Registers the recurrent jobs at startup. Stable ids mean a restart
    /// replaces rather than duplicates them.
    #[instrument(skip(self))]
    pub async fn register_recurrent_jobs(
        &self,
        fleet_metrics_interval: Duration,
        labs_refresh_interval: Duration,
        activity_detection_interval: Duration,
        auto_import_interval: Duration,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        for (kind, interval) in [
            (JobKind::FleetMetrics, fleet_metrics_interval),
            (JobKind::LabsRefresh, labs_refresh_interval),
            (JobKind::ActivityDetection, activity_detection_interval),
            (JobKind::AutoImport, auto_import_interval),
        ] {
            let job = ScheduledJob::recurrent(kind, interval.as_secs(), now);
            self.services.jobs.upsert(&job).await?;
        }
        Ok(())
    }

    /// Runs the dispatch loop for the lifetime of the process.
    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DISPATCH_TICK);
            info!("job dispatcher started");
            loop {
                ticker.tick().await;
                let due = match self.services.jobs.due(Utc::now()).await {
                    Ok(jobs) => jobs,
                    Err(err) => {
                        error!(error = %err, "failed to poll job store");
                        continue;
                    }
                };
                for job in due {
                    self.clone().run_job(job);
                }
            }
        });
    }

    fn run_job(self: Arc<Self>, mut job: ScheduledJob) {
        tokio::spawn(async move {
            job.status = JobStatus::Running;
            let _ = self.services.jobs.upsert(&job).await;

            let outcome = self.dispatch(&job.kind).await;
            let now = Utc::now();
            let error = outcome.err().map(|e| e.to_string());
            if let Some(ref msg) = error {
                warn!(job_id = %job.id, error = msg, "job execution failed");
            }
            job.reschedule_after_run(now, error);
            if job.status == JobStatus::Completed {
                let _ = self.services.jobs.remove(&job.id).await;
            } else {
                let _ = self.services.jobs.upsert(&job).await;
            }
        });
    }

    async fn dispatch(&self, kind: &JobKind) -> anyhow::Result<()> {
        match kind {
            JobKind::FleetMetrics => self.run_fleet_metrics().await,
            JobKind::LabsRefresh => self.run_labs_refresh().await,
            JobKind::ActivityDetection => self.run_activity_detection().await,
            JobKind::AutoImport => self.run_auto_import().await,
            JobKind::OnDemandRefresh { worker_id } => self.run_on_demand_refresh(worker_id).await,
        }
    }

    #[instrument(skip(self))]
    async fn run_fleet_metrics(&self) -> anyhow::Result<()> {
        let workers = self.services.workers.get_active().await?;
        let semaphore = Arc::new(Semaphore::new(FLEET_METRICS_CONCURRENCY));
        let settings = self.services.settings.get().await?;

        let tasks = workers.into_iter().map(|mut worker| {
            let semaphore = semaphore.clone();
            let metrics_cloud = self.services.cloud.clone();
            let threshold = settings.monitoring.change_threshold_percent;
            let poll_interval = settings.monitoring.cloud_metrics_poll_interval_seconds;
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let metrics_service = crate::metrics_service::MetricsService::new(metrics_cloud.as_ref());
                metrics_service
                    .refresh(&mut worker, true, threshold, Some(poll_interval), Utc::now())
                    .await;
                worker
            }
        });

        let mut updated: Vec<_> = futures::future::join_all(tasks).await;
        self.services.workers.update_many(&mut updated).await?;

        for worker in &updated {
            if worker.status == WorkerStatus::Running && worker.lab_metrics.ready {
                if let Err(err) = refresh_worker_labs(&self.services, worker.id).await {
                    warn!(worker_id = %worker.id, error = %err, "labs refresh within fleet metrics job failed");
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn run_labs_refresh(&self) -> anyhow::Result<()> {
        let workers = self.services.workers.get_by_status(WorkerStatus::Running).await?;
        for worker in workers {
            if let Err(err) = refresh_worker_labs(&self.services, worker.id).await {
                warn!(worker_id = %worker.id, error = %err, "fleet-wide labs refresh failed for worker");
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn run_activity_detection(&self) -> anyhow::Result<()> {
        let settings = self.services.settings.get().await?;
        let timeout = chrono::Duration::minutes(settings.idle_detection.idle_timeout_minutes as i64);
        let workers = self.services.workers.get_by_status(WorkerStatus::Running).await?;
        let semaphore = Arc::new(Semaphore::new(ACTIVITY_DETECTION_CONCURRENCY));
        let now = Utc::now();

        let tasks = workers.into_iter().map(|worker| {
            let semaphore = semaphore.clone();
            let services = &self.services;
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let verdict = idle::evaluate(&worker, now, timeout);
                if verdict.is_idle {
                    let mut worker = worker;
                    services
                        .relay
                        .publish_domain_event(&fleet_domain::DomainEvent::IdleDetected {
                            worker_id: worker.id,
                            idle_since: verdict.idle_since.unwrap_or(now),
                            at: now,
                        })
                        .await;
                    worker.pause("idle timeout exceeded".into(), "scheduler".into(), true, now);
                    let _ = services.workers.update(&mut worker).await;
                    if let Some(instance_id) = worker.instance_id.clone() {
                        let _ = services.cloud.stop_instance(&worker.region, &instance_id).await;
                    }
                }
            }
        });
        futures::future::join_all(tasks).await;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn run_auto_import(&self) -> anyhow::Result<()> {
        let settings = self.services.settings.get().await?;
        if settings.worker_provisioning.default_image_id.is_empty() {
            return Ok(());
        }
        let result = bulk_import_workers(
            &self.services,
            settings.worker_provisioning.default_region.clone(),
            Some(settings.worker_provisioning.default_image_id.clone()),
            None,
            "scheduler".into(),
        )
        .await?;
        if result.total_imported > 0 {
            info!(imported = result.total_imported, "auto-import discovered new instances");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn run_on_demand_refresh(&self, worker_id: &str) -> anyhow::Result<()> {
        let worker_id = WorkerId::from_str(worker_id)?;
        refresh_worker_metrics(&self.services, worker_id, true).await?;
        Ok(())
    }
}
