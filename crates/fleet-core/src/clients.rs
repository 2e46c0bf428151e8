//! [crates/fleet-core/src/clients.rs]
//! Ports for the two external authorities the engine reconciles against: the
//! cloud compute provider and the lab service's own HTTPS API.
//! `fleet-clients` supplies the concrete adapters; the real cloud SDK
//! integration is out of scope, so only a fake ships for it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("operation rejected: {0}")]
    Operation(String),

    #[error("call timed out or transport failed: {0}")]
    Transient(String),
}

#[derive(Debug, Clone)]
pub struct InstanceStatus {
    pub state: String,
    pub instance_status_check: Option<String>,
    pub system_status_check: Option<String>,
    pub monitoring_state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InstanceDetails {
    pub instance_type: String,
    pub image_id: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ImageDetails {
    pub name: Option<String>,
    pub description: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
}

/// `None` fields mean the provider's monitoring agent reported its "unknown"
/// sentinel, not that the call failed.
#[derive(Debug, Clone, Default)]
pub struct ResourceMetrics {
    pub cpu_utilization: Option<f64>,
    pub memory_utilization: Option<f64>,
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn create_instance(
        &self,
        region: &str,
        instance_type: &str,
        image_id: &str,
        tags: &HashMap<String, String>,
    ) -> Result<String, ClientError>;

    async fn start_instance(&self, region: &str, instance_id: &str) -> Result<(), ClientError>;
    async fn stop_instance(&self, region: &str, instance_id: &str) -> Result<(), ClientError>;
    async fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<(), ClientError>;

    async fn describe_instance_status(
        &self,
        region: &str,
        instance_id: &str,
    ) -> Result<Option<InstanceStatus>, ClientError>;

    async fn describe_instance(&self, region: &str, instance_id: &str) -> Result<InstanceDetails, ClientError>;
    async fn describe_image(&self, region: &str, image_id: &str) -> Result<ImageDetails, ClientError>;

    async fn describe_images_by_name_pattern(
        &self,
        region: &str,
        pattern: &str,
    ) -> Result<Vec<String>, ClientError>;

    async fn list_instances_by_filters(
        &self,
        region: &str,
        image_id: Option<&str>,
        image_name_pattern: Option<&str>,
    ) -> Result<Vec<String>, ClientError>;

    async fn create_tags(&self, region: &str, instance_id: &str, tags: &HashMap<String, String>) -> Result<(), ClientError>;
    async fn delete_tags(&self, region: &str, instance_id: &str, keys: &[String]) -> Result<(), ClientError>;
    async fn describe_tags(&self, region: &str, instance_id: &str) -> Result<HashMap<String, String>, ClientError>;

    /// Mean CPU/memory utilization over the provider's trailing 5-minute window.
    async fn get_metric_statistics(&self, region: &str, instance_id: &str) -> Result<ResourceMetrics, ClientError>;
}

#[derive(Debug, Clone)]
pub struct SystemInformation {
    pub version: String,
    pub ready: bool,
    pub oui: Option<String>,
    pub allow_ssh_pubkey_auth: bool,
}

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub valid: bool,
    pub is_licensed: bool,
    pub is_enterprise: bool,
    pub computes: Value,
    pub controller: Value,
}

#[derive(Debug, Clone)]
pub struct SystemStats {
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct LicenseInfo {
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct LabSummary {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct LabDetails {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub state: String,
    pub owner_username: Option<String>,
    pub owner_full_name: Option<String>,
    pub node_count: u32,
    pub link_count: u32,
    pub groups: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait LabApiClient: Send + Sync {
    async fn system_information(&self, endpoint: &str) -> Result<SystemInformation, ClientError>;
    async fn system_health(&self, endpoint: &str) -> Result<SystemHealth, ClientError>;
    async fn system_stats(&self, endpoint: &str) -> Result<SystemStats, ClientError>;
    async fn licensing(&self, endpoint: &str) -> Result<LicenseInfo, ClientError>;

    async fn list_labs(&self, endpoint: &str) -> Result<Vec<LabSummary>, ClientError>;
    async fn get_lab(&self, endpoint: &str, lab_id: &str) -> Result<LabDetails, ClientError>;

    async fn start_lab(&self, endpoint: &str, lab_id: &str) -> Result<(), ClientError>;
    async fn stop_lab(&self, endpoint: &str, lab_id: &str) -> Result<(), ClientError>;
    async fn wipe_lab(&self, endpoint: &str, lab_id: &str) -> Result<(), ClientError>;
    async fn delete_lab(&self, endpoint: &str, lab_id: &str) -> Result<(), ClientError>;

    async fn download_lab(&self, endpoint: &str, lab_id: &str) -> Result<String, ClientError>;
    async fn import_lab(&self, endpoint: &str, title: &str, topology_yaml: &str) -> Result<String, ClientError>;

    async fn telemetry_events(&self, endpoint: &str) -> Result<Vec<Value>, ClientError>;
}
