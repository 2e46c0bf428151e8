//! [apps/fleet-orchestrator/src/bootstrap.rs]
//! Wires the concrete adapters (`fleet-db`, `fleet-clients`) into the
//! `Services` locator `fleet-core` depends on, registers the recurrent jobs,
//! and starts the background dispatch and relay-listener tasks: connect the
//! database, construct the repositories, hand them to the router/state, then
//! bring up the job scheduler and event relay this engine additionally owns.

use crate::config::AppConfig;
use fleet_clients::lab_api::{LabApiConfig, ReqwestLabApiClient};
use fleet_clients::FakeCloudProvider;
use fleet_core::relay::{EventRelay, InMemoryPubSub};
use fleet_core::scheduler::JobRunner;
use fleet_core::throttle::RefreshThrottle;
use fleet_core::Services;
use fleet_db::{DbClient, DbJobStore, DbLabRecordRepository, DbSettingsRepository, DbWorkerRepository};
use std::sync::Arc;
use tracing::info;

/// Everything `main` needs after bootstrap: the service locator handed to the
/// HTTP layer, plus the job runner whose dispatch loop must be spawned once
/// the async runtime is up.
pub struct Application {
    pub services: Services,
    pub job_runner: Arc<JobRunner>,
}

pub async fn bootstrap(config: &AppConfig) -> anyhow::Result<Application> {
    let db = DbClient::connect(&config.database_url, config.database_auth_token.clone()).await?;
    info!("database connection established");

    let relay = Arc::new(EventRelay::new(Box::new(InMemoryPubSub::new()), "fleet-events"));
    relay.clone().spawn_listener().await?;

    let workers = Arc::new(DbWorkerRepository::new(db.clone(), relay.clone()));
    let labs = Arc::new(DbLabRecordRepository::new(db.clone()));
    let settings = Arc::new(DbSettingsRepository::new(db.clone()));
    let jobs = Arc::new(DbJobStore::new(db.clone()));

    let cloud = Arc::new(FakeCloudProvider::new());
    let lab_api = Arc::new(ReqwestLabApiClient::new(LabApiConfig {
        username: config.lab_api_username.clone(),
        password: config.lab_api_password.clone(),
        verify_tls: config.lab_api_verify_tls,
    }));

    let throttle = Arc::new(RefreshThrottle::with_default_interval());

    let services = Services {
        workers,
        labs,
        settings,
        jobs,
        cloud,
        lab_api,
        relay,
        throttle,
    };

    let job_runner = Arc::new(JobRunner::new(services.clone()));
    job_runner
        .register_recurrent_jobs(
            config.fleet_metrics_interval,
            config.labs_refresh_interval,
            config.activity_detection_interval,
            config.auto_import_interval,
        )
        .await?;

    Ok(Application { services, job_runner })
}
