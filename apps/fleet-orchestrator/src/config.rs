//! [apps/fleet-orchestrator/src/config.rs]
//! Process configuration read from the environment at startup: the usual
//! `DATABASE_URL`/`TURSO_AUTH_TOKEN`/`PORT` reads, plus the job-interval and
//! lab-credential settings this engine additionally needs.

use std::time::Duration;

pub struct AppConfig {
    pub database_url: String,
    pub database_auth_token: Option<String>,
    pub port: u16,

    pub lab_api_username: String,
    pub lab_api_password: String,
    pub lab_api_verify_tls: bool,

    pub fleet_metrics_interval: Duration,
    pub labs_refresh_interval: Duration,
    pub activity_detection_interval: Duration,
    pub auto_import_interval: Duration,
}

fn env_duration_seconds(key: &str, default_seconds: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_seconds))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| ":memory:".to_string());
        let database_auth_token = std::env::var("TURSO_AUTH_TOKEN").ok();
        let port: u16 = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().unwrap_or(3000);

        let lab_api_username = std::env::var("LAB_API_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let lab_api_password = std::env::var("LAB_API_PASSWORD").unwrap_or_default();
        let lab_api_verify_tls = std::env::var("LAB_API_VERIFY_TLS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            database_auth_token,
            port,
            lab_api_username,
            lab_api_password,
            lab_api_verify_tls,
            fleet_metrics_interval: env_duration_seconds("FLEET_METRICS_INTERVAL_SECONDS", 300),
            labs_refresh_interval: env_duration_seconds("LABS_REFRESH_INTERVAL_SECONDS", 1800),
            activity_detection_interval: env_duration_seconds("ACTIVITY_DETECTION_INTERVAL_SECONDS", 1800),
            auto_import_interval: env_duration_seconds("AUTO_IMPORT_INTERVAL_SECONDS", 600),
        })
    }
}
