//! [crates/fleet-core/src/test_support.rs]
//! In-memory fakes for the ports this crate declares. Command and service
//! tests build a `Services` locator out of these instead of the real
//! database/cloud/lab-API adapters, so orchestration logic is exercised
//! without I/O. Test-only: compiled under `#[cfg(test)]` and never linked
//! into a release binary.

#![cfg(test)]

use crate::clients::{
    ClientError, CloudProvider, ImageDetails, InstanceDetails, InstanceStatus, LabApiClient, LabDetails,
    LabSummary, LicenseInfo, ResourceMetrics, SystemHealth, SystemInformation, SystemStats,
};
use crate::context::Services;
use crate::relay::{EventRelay, InMemoryPubSub};
use crate::repositories::{LabRecordRepository, SettingsRepository, WorkerRepository};
use crate::result::CoreError;
use crate::scheduler::job_store::JobStore;
use crate::scheduler::jobs::ScheduledJob;
use crate::throttle::RefreshThrottle;
use async_trait::async_trait;
use fleet_domain::{LabId, LabRecord, SystemSettings, WorkerAggregate, WorkerId, WorkerStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

#[derive(Default)]
pub struct InMemoryWorkerRepository {
    workers: Mutex<HashMap<WorkerId, WorkerAggregate>>,
}

impl InMemoryWorkerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a worker directly, discarding any pending events — mirrors a
    /// row that was already committed before the test started.
    pub fn seed(&self, mut agg: WorkerAggregate) -> WorkerId {
        agg.take_pending_events();
        let id = agg.id;
        self.workers.lock().expect("fake worker repo poisoned").insert(id, agg);
        id
    }
}

#[async_trait]
impl WorkerRepository for InMemoryWorkerRepository {
    async fn get(&self, id: WorkerId) -> Result<Option<WorkerAggregate>, CoreError> {
        Ok(self.workers.lock().expect("fake worker repo poisoned").get(&id).cloned())
    }

    async fn add(&self, agg: &mut WorkerAggregate) -> Result<(), CoreError> {
        agg.take_pending_events();
        self.workers
            .lock()
            .expect("fake worker repo poisoned")
            .insert(agg.id, agg.clone());
        Ok(())
    }

    async fn update(&self, agg: &mut WorkerAggregate) -> Result<(), CoreError> {
        agg.take_pending_events();
        let mut guard = self.workers.lock().expect("fake worker repo poisoned");
        if !guard.contains_key(&agg.id) {
            return Err(CoreError::NotFound(format!("worker {} not found", agg.id)));
        }
        guard.insert(agg.id, agg.clone());
        Ok(())
    }

    async fn update_many(&self, aggs: &mut [WorkerAggregate]) -> Result<(), CoreError> {
        for agg in aggs.iter_mut() {
            self.update(agg).await?;
        }
        Ok(())
    }

    async fn delete(&self, id: WorkerId, agg: Option<&mut WorkerAggregate>) -> Result<(), CoreError> {
        self.workers.lock().expect("fake worker repo poisoned").remove(&id);
        if let Some(agg) = agg {
            agg.take_pending_events();
        }
        Ok(())
    }

    async fn get_by_cloud_instance_id(&self, instance_id: &str) -> Result<Option<WorkerAggregate>, CoreError> {
        Ok(self
            .workers
            .lock()
            .expect("fake worker repo poisoned")
            .values()
            .find(|w| w.instance_id.as_deref() == Some(instance_id))
            .cloned())
    }

    async fn get_by_status(&self, status: WorkerStatus) -> Result<Vec<WorkerAggregate>, CoreError> {
        Ok(self
            .workers
            .lock()
            .expect("fake worker repo poisoned")
            .values()
            .filter(|w| w.status == status)
            .cloned()
            .collect())
    }

    async fn get_active(&self) -> Result<Vec<WorkerAggregate>, CoreError> {
        Ok(self
            .workers
            .lock()
            .expect("fake worker repo poisoned")
            .values()
            .filter(|w| w.status != WorkerStatus::Terminated)
            .cloned()
            .collect())
    }

    async fn get_by_region(&self, region: &str) -> Result<Vec<WorkerAggregate>, CoreError> {
        Ok(self
            .workers
            .lock()
            .expect("fake worker repo poisoned")
            .values()
            .filter(|w| w.region == region)
            .cloned()
            .collect())
    }

    async fn get_idle(&self, threshold_minutes: i64) -> Result<Vec<WorkerAggregate>, CoreError> {
        let now = chrono::Utc::now();
        let threshold = chrono::Duration::minutes(threshold_minutes);
        Ok(self
            .workers
            .lock()
            .expect("fake worker repo poisoned")
            .values()
            .filter(|w| w.status == WorkerStatus::Running && w.is_idle_detection_enabled)
            .filter(|w| now - w.last_activity_at.unwrap_or(w.created_at) >= threshold)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryLabRecordRepository {
    records: Mutex<HashMap<(WorkerId, LabId), LabRecord>>,
}

impl InMemoryLabRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LabRecordRepository for InMemoryLabRecordRepository {
    async fn get(&self, worker_id: WorkerId, lab_id: &LabId) -> Result<Option<LabRecord>, CoreError> {
        Ok(self
            .records
            .lock()
            .expect("fake lab repo poisoned")
            .get(&(worker_id, lab_id.clone()))
            .cloned())
    }

    async fn get_for_worker(&self, worker_id: WorkerId) -> Result<Vec<LabRecord>, CoreError> {
        Ok(self
            .records
            .lock()
            .expect("fake lab repo poisoned")
            .values()
            .filter(|r| r.worker_id == worker_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, record: &LabRecord) -> Result<(), CoreError> {
        self.records
            .lock()
            .expect("fake lab repo poisoned")
            .insert((record.worker_id, record.lab_id.clone()), record.clone());
        Ok(())
    }

    async fn upsert_many(&self, records: &[LabRecord]) -> Result<(), CoreError> {
        for record in records {
            self.upsert(record).await?;
        }
        Ok(())
    }

    async fn delete(&self, worker_id: WorkerId, lab_id: &LabId) -> Result<(), CoreError> {
        self.records
            .lock()
            .expect("fake lab repo poisoned")
            .remove(&(worker_id, lab_id.clone()));
        Ok(())
    }
}

pub struct InMemorySettingsRepository {
    settings: Mutex<SystemSettings>,
}

impl InMemorySettingsRepository {
    pub fn new(settings: SystemSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl Default for InMemorySettingsRepository {
    fn default() -> Self {
        Self::new(SystemSettings::default())
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self) -> Result<SystemSettings, CoreError> {
        Ok(self.settings.lock().expect("fake settings repo poisoned").clone())
    }

    async fn update(&self, settings: &SystemSettings) -> Result<(), CoreError> {
        *self.settings.lock().expect("fake settings repo poisoned") = settings.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, ScheduledJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn upsert(&self, job: &ScheduledJob) -> Result<(), CoreError> {
        self.jobs
            .lock()
            .expect("fake job store poisoned")
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledJob>, CoreError> {
        Ok(self.jobs.lock().expect("fake job store poisoned").get(id).cloned())
    }

    async fn due(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<ScheduledJob>, CoreError> {
        Ok(self
            .jobs
            .lock()
            .expect("fake job store poisoned")
            .values()
            .filter(|j| j.is_due(now))
            .cloned()
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<(), CoreError> {
        self.jobs.lock().expect("fake job store poisoned").remove(id);
        Ok(())
    }
}

/// Same instance model as `fleet_clients::FakeCloudProvider`, duplicated here
/// rather than pulled in as a dev-dependency so this crate's test suite does
/// not depend on the crate that depends on it.
#[derive(Debug, Clone)]
struct StubInstance {
    region: String,
    instance_type: String,
    image_id: String,
    state: String,
    public_ip: Option<String>,
    private_ip: Option<String>,
    tags: HashMap<String, String>,
}

#[derive(Default)]
pub struct StubCloudProvider {
    instances: Mutex<HashMap<String, StubInstance>>,
    /// When set, `get_metric_statistics` returns this error instead of a reading.
    pub metrics_error: Mutex<Option<ClientErrorKind>>,
}

#[derive(Debug, Clone, Copy)]
pub enum ClientErrorKind {
    Transient,
    NotFound,
}

impl StubCloudProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instance directly, as if it already existed in the cloud
    /// before the test began (the usual starting point for import/metrics tests).
    pub fn seed_instance(&self, id: &str, region: &str, state: &str) -> String {
        self.instances.lock().expect("stub cloud poisoned").insert(
            id.to_string(),
            StubInstance {
                region: region.to_string(),
                instance_type: "m5.large".to_string(),
                image_id: "ami-1".to_string(),
                state: state.to_string(),
                public_ip: Some("203.0.113.10".to_string()),
                private_ip: Some("10.0.0.10".to_string()),
                tags: HashMap::new(),
            },
        );
        id.to_string()
    }

    pub fn set_state(&self, id: &str, state: &str) {
        if let Some(instance) = self.instances.lock().expect("stub cloud poisoned").get_mut(id) {
            instance.state = state.to_string();
        }
    }

    pub fn remove_instance(&self, id: &str) {
        self.instances.lock().expect("stub cloud poisoned").remove(id);
    }
}

#[async_trait]
impl CloudProvider for StubCloudProvider {
    async fn create_instance(
        &self,
        region: &str,
        instance_type: &str,
        image_id: &str,
        tags: &HashMap<String, String>,
    ) -> Result<String, ClientError> {
        let id = format!("i-{}", uuid::Uuid::new_v4().simple());
        self.instances.lock().expect("stub cloud poisoned").insert(
            id.clone(),
            StubInstance {
                region: region.to_string(),
                instance_type: instance_type.to_string(),
                image_id: image_id.to_string(),
                state: "pending".to_string(),
                public_ip: Some("203.0.113.20".to_string()),
                private_ip: Some("10.0.0.20".to_string()),
                tags: tags.clone(),
            },
        );
        Ok(id)
    }

    async fn start_instance(&self, _region: &str, instance_id: &str) -> Result<(), ClientError> {
        let mut instances = self.instances.lock().expect("stub cloud poisoned");
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        instance.state = "running".to_string();
        Ok(())
    }

    async fn stop_instance(&self, _region: &str, instance_id: &str) -> Result<(), ClientError> {
        let mut instances = self.instances.lock().expect("stub cloud poisoned");
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        instance.state = "stopped".to_string();
        Ok(())
    }

    async fn terminate_instance(&self, _region: &str, instance_id: &str) -> Result<(), ClientError> {
        let mut instances = self.instances.lock().expect("stub cloud poisoned");
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        instance.state = "terminated".to_string();
        Ok(())
    }

    async fn describe_instance_status(
        &self,
        _region: &str,
        instance_id: &str,
    ) -> Result<Option<InstanceStatus>, ClientError> {
        let instances = self.instances.lock().expect("stub cloud poisoned");
        Ok(instances.get(instance_id).map(|instance| InstanceStatus {
            state: instance.state.clone(),
            instance_status_check: Some("ok".to_string()),
            system_status_check: Some("ok".to_string()),
            monitoring_state: Some("enabled".to_string()),
        }))
    }

    async fn describe_instance(&self, _region: &str, instance_id: &str) -> Result<InstanceDetails, ClientError> {
        let instances = self.instances.lock().expect("stub cloud poisoned");
        let instance = instances
            .get(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        Ok(InstanceDetails {
            instance_type: instance.instance_type.clone(),
            image_id: instance.image_id.clone(),
            public_ip: instance.public_ip.clone(),
            private_ip: instance.private_ip.clone(),
            tags: instance.tags.clone(),
        })
    }

    async fn describe_image(&self, _region: &str, image_id: &str) -> Result<ImageDetails, ClientError> {
        Ok(ImageDetails {
            name: Some(image_id.to_string()),
            description: None,
            creation_date: None,
        })
    }

    async fn describe_images_by_name_pattern(
        &self,
        _region: &str,
        pattern: &str,
    ) -> Result<Vec<String>, ClientError> {
        let instances = self.instances.lock().expect("stub cloud poisoned");
        Ok(instances
            .values()
            .map(|instance| instance.image_id.clone())
            .filter(|image_id| image_id.contains(pattern))
            .collect())
    }

    async fn list_instances_by_filters(
        &self,
        region: &str,
        image_id: Option<&str>,
        image_name_pattern: Option<&str>,
    ) -> Result<Vec<String>, ClientError> {
        let instances = self.instances.lock().expect("stub cloud poisoned");
        Ok(instances
            .iter()
            .filter(|(_, instance)| instance.region == region)
            .filter(|(_, instance)| instance.state != "terminated")
            .filter(|(_, instance)| image_id.map_or(true, |wanted| instance.image_id == wanted))
            .filter(|(_, instance)| image_name_pattern.map_or(true, |pattern| instance.image_id.contains(pattern)))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn create_tags(&self, _region: &str, instance_id: &str, tags: &HashMap<String, String>) -> Result<(), ClientError> {
        let mut instances = self.instances.lock().expect("stub cloud poisoned");
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        instance.tags.extend(tags.clone());
        Ok(())
    }

    async fn delete_tags(&self, _region: &str, instance_id: &str, keys: &[String]) -> Result<(), ClientError> {
        let mut instances = self.instances.lock().expect("stub cloud poisoned");
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        for key in keys {
            instance.tags.remove(key);
        }
        Ok(())
    }

    async fn describe_tags(&self, _region: &str, instance_id: &str) -> Result<HashMap<String, String>, ClientError> {
        let instances = self.instances.lock().expect("stub cloud poisoned");
        let instance = instances
            .get(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        Ok(instance.tags.clone())
    }

    async fn get_metric_statistics(&self, _region: &str, instance_id: &str) -> Result<ResourceMetrics, ClientError> {
        if let Some(kind) = *self.metrics_error.lock().expect("stub cloud poisoned") {
            return Err(match kind {
                ClientErrorKind::Transient => ClientError::Transient("metrics backend unavailable".into()),
                ClientErrorKind::NotFound => ClientError::NotFound(instance_id.to_string()),
            });
        }
        let instances = self.instances.lock().expect("stub cloud poisoned");
        instances
            .get(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        Ok(ResourceMetrics {
            cpu_utilization: Some(12.5),
            memory_utilization: Some(34.0),
        })
    }
}

/// Scriptable `LabApiClient` fake. Tests seed `labs` up front; `refresh_worker_labs`
/// and the lab-control commands exercise real orchestration logic against it.
#[derive(Default)]
pub struct StubLabApiClient {
    labs: Mutex<HashMap<String, LabDetails>>,
}

impl StubLabApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_lab(&self, details: LabDetails) {
        self.labs.lock().expect("stub lab api poisoned").insert(details.id.clone(), details);
    }

    pub fn remove_lab(&self, id: &str) {
        self.labs.lock().expect("stub lab api poisoned").remove(id);
    }
}

fn sample_lab(id: &str, title: &str, state: &str) -> LabDetails {
    LabDetails {
        id: id.to_string(),
        title: title.to_string(),
        description: None,
        notes: None,
        state: state.to_string(),
        owner_username: None,
        owner_full_name: None,
        node_count: 1,
        link_count: 0,
        groups: vec![],
        created_at: None,
        modified_at: None,
    }
}

pub fn seeded_lab_details(id: &str, title: &str, state: &str) -> LabDetails {
    sample_lab(id, title, state)
}

#[async_trait]
impl LabApiClient for StubLabApiClient {
    async fn system_information(&self, _endpoint: &str) -> Result<SystemInformation, ClientError> {
        Ok(SystemInformation {
            version: "2.7.0".to_string(),
            ready: true,
            oui: None,
            allow_ssh_pubkey_auth: true,
        })
    }

    async fn system_health(&self, _endpoint: &str) -> Result<SystemHealth, ClientError> {
        Ok(SystemHealth {
            valid: true,
            is_licensed: true,
            is_enterprise: true,
            computes: Value::Null,
            controller: Value::Null,
        })
    }

    async fn system_stats(&self, _endpoint: &str) -> Result<SystemStats, ClientError> {
        Ok(SystemStats { raw: Value::Null })
    }

    async fn licensing(&self, _endpoint: &str) -> Result<LicenseInfo, ClientError> {
        Ok(LicenseInfo { raw: Value::Null })
    }

    async fn list_labs(&self, _endpoint: &str) -> Result<Vec<LabSummary>, ClientError> {
        Ok(self
            .labs
            .lock()
            .expect("stub lab api poisoned")
            .keys()
            .map(|id| LabSummary { id: id.clone() })
            .collect())
    }

    async fn get_lab(&self, _endpoint: &str, lab_id: &str) -> Result<LabDetails, ClientError> {
        self.labs
            .lock()
            .expect("stub lab api poisoned")
            .get(lab_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(lab_id.to_string()))
    }

    async fn start_lab(&self, _endpoint: &str, lab_id: &str) -> Result<(), ClientError> {
        let mut labs = self.labs.lock().expect("stub lab api poisoned");
        let lab = labs.get_mut(lab_id).ok_or_else(|| ClientError::NotFound(lab_id.to_string()))?;
        lab.state = "STARTED".to_string();
        Ok(())
    }

    async fn stop_lab(&self, _endpoint: &str, lab_id: &str) -> Result<(), ClientError> {
        let mut labs = self.labs.lock().expect("stub lab api poisoned");
        let lab = labs.get_mut(lab_id).ok_or_else(|| ClientError::NotFound(lab_id.to_string()))?;
        lab.state = "STOPPED".to_string();
        Ok(())
    }

    async fn wipe_lab(&self, _endpoint: &str, lab_id: &str) -> Result<(), ClientError> {
        let mut labs = self.labs.lock().expect("stub lab api poisoned");
        let lab = labs.get_mut(lab_id).ok_or_else(|| ClientError::NotFound(lab_id.to_string()))?;
        lab.state = "DEFINED_ON_CORE".to_string();
        Ok(())
    }

    async fn delete_lab(&self, _endpoint: &str, lab_id: &str) -> Result<(), ClientError> {
        self.labs
            .lock()
            .expect("stub lab api poisoned")
            .remove(lab_id)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(lab_id.to_string()))
    }

    async fn download_lab(&self, _endpoint: &str, lab_id: &str) -> Result<String, ClientError> {
        if self.labs.lock().expect("stub lab api poisoned").contains_key(lab_id) {
            Ok("topology: {}".to_string())
        } else {
            Err(ClientError::NotFound(lab_id.to_string()))
        }
    }

    async fn import_lab(&self, _endpoint: &str, title: &str, _topology_yaml: &str) -> Result<String, ClientError> {
        let id = format!("lab-{}", uuid::Uuid::new_v4().simple());
        self.seed_lab(sample_lab(&id, title, "DEFINED_ON_CORE"));
        Ok(id)
    }

    async fn telemetry_events(&self, _endpoint: &str) -> Result<Vec<Value>, ClientError> {
        Ok(vec![])
    }
}

/// Assembles a `Services` locator wired entirely out of in-memory fakes.
pub fn test_services() -> Services {
    test_services_with(Arc::new(StubCloudProvider::new()), Arc::new(StubLabApiClient::new()))
}

/// Same as `test_services`, but lets the caller keep a concrete handle to the
/// cloud/lab-API stubs (to seed instances/labs or assert on their state) while
/// still installing them into `Services` as trait objects.
pub fn test_services_with(cloud: Arc<StubCloudProvider>, lab_api: Arc<StubLabApiClient>) -> Services {
    let relay = Arc::new(EventRelay::new(Box::new(InMemoryPubSub::new()), "test"));
    Services {
        workers: Arc::new(InMemoryWorkerRepository::new()),
        labs: Arc::new(InMemoryLabRecordRepository::new()),
        settings: Arc::new(InMemorySettingsRepository::default()),
        jobs: Arc::new(InMemoryJobStore::new()),
        cloud,
        lab_api,
        relay,
        throttle: Arc::new(RefreshThrottle::with_default_interval()),
    }
}

/// Builds a `Running` worker with an assigned instance and endpoint, the
/// common starting point for refresh/metrics/lab-control tests.
pub fn running_worker(region: &str) -> WorkerAggregate {
    let now = chrono::Utc::now();
    let mut agg = WorkerAggregate::create(
        WorkerId::new(),
        "test-worker".into(),
        region.into(),
        "m5.large".into(),
        "ami-1".into(),
        "tester".into(),
        now,
    );
    agg.take_pending_events();
    agg.status = WorkerStatus::Running;
    agg
}
