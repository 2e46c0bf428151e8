//! [apps/fleet-orchestrator/src/main.rs]
//! Process entry point: loads configuration, wires persistence and the
//! external collaborators, starts the job dispatcher and event relay, and
//! serves the demonstration HTTP surface. `dotenv().ok()` → `init_tracing` →
//! build the Tokio runtime → bootstrap the services → launch.

mod bootstrap;
mod config;
mod http;

use config::AppConfig;
use dotenvy::dotenv;
use fleet_core::telemetry::init_tracing;
use tracing::info;

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        let config = AppConfig::from_env()?;
        let app = bootstrap::bootstrap(&config).await?;

        app.job_runner.clone().spawn();
        info!("job dispatcher and event relay running");

        let router = http::router(app.services);
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
        info!(port = config.port, "fleet orchestrator listening");
        axum::serve(listener, router).await?;

        Ok(())
    })
}
