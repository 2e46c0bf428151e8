//! [crates/fleet-clients/src/fake_cloud.rs]
//! Deterministic in-memory stand-in for the cloud compute SDK. The real
//! integration is explicitly out of scope; this adapter exists so
//! the rest of the engine — provisioning, bulk import, metrics polling,
//! activity-driven stop — can be exercised end to end without a live account.
//! A `Mutex`-guarded in-memory map stands in for the external system at the
//! edge of the process.

use async_trait::async_trait;
use fleet_core::clients::{
    ClientError, CloudProvider, ImageDetails, InstanceDetails, InstanceStatus, ResourceMetrics,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct FakeInstance {
    region: String,
    instance_type: String,
    image_id: String,
    state: String,
    public_ip: Option<String>,
    private_ip: Option<String>,
    tags: HashMap<String, String>,
}

/// Holds its fleet in memory; state resets on process restart. Instance ids
/// and IPs are derived from a uuid so repeated runs don't collide.
pub struct FakeCloudProvider {
    instances: Mutex<HashMap<String, FakeInstance>>,
}

impl FakeCloudProvider {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for FakeCloudProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudProvider for FakeCloudProvider {
    async fn create_instance(
        &self,
        region: &str,
        instance_type: &str,
        image_id: &str,
        tags: &HashMap<String, String>,
    ) -> Result<String, ClientError> {
        let id = format!("i-{}", uuid::Uuid::new_v4().simple());
        let suffix = &id[id.len() - 8..];
        let instance = FakeInstance {
            region: region.to_string(),
            instance_type: instance_type.to_string(),
            image_id: image_id.to_string(),
            state: "pending".to_string(),
            public_ip: Some(format!("203.0.113.{}", (suffix.as_bytes()[0] % 254) + 1)),
            private_ip: Some(format!("10.0.{}.{}", suffix.as_bytes()[1] % 254, suffix.as_bytes()[2] % 254)),
            tags: tags.clone(),
        };
        self.instances.lock().unwrap().insert(id.clone(), instance);
        Ok(id)
    }

    async fn start_instance(&self, _region: &str, instance_id: &str) -> Result<(), ClientError> {
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        instance.state = "running".to_string();
        Ok(())
    }

    async fn stop_instance(&self, _region: &str, instance_id: &str) -> Result<(), ClientError> {
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        instance.state = "stopped".to_string();
        Ok(())
    }

    async fn terminate_instance(&self, _region: &str, instance_id: &str) -> Result<(), ClientError> {
        let mut instances = self.instances.lock().unwrap();
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
        let instances = self.instances.lock().unwrap();
        Ok(instances.get(instance_id).map(|instance| InstanceStatus {
            state: instance.state.clone(),
            instance_status_check: Some("ok".to_string()),
            system_status_check: Some("ok".to_string()),
            monitoring_state: Some("enabled".to_string()),
        }))
    }

    async fn describe_instance(&self, _region: &str, instance_id: &str) -> Result<InstanceDetails, ClientError> {
        let instances = self.instances.lock().unwrap();
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
        let instances = self.instances.lock().unwrap();
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
        let instances = self.instances.lock().unwrap();
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
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        instance.tags.extend(tags.clone());
        Ok(())
    }

    async fn delete_tags(&self, _region: &str, instance_id: &str, keys: &[String]) -> Result<(), ClientError> {
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        for key in keys {
            instance.tags.remove(key);
        }
        Ok(())
    }

    async fn describe_tags(&self, _region: &str, instance_id: &str) -> Result<HashMap<String, String>, ClientError> {
        let instances = self.instances.lock().unwrap();
        let instance = instances
            .get(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        Ok(instance.tags.clone())
    }

    async fn get_metric_statistics(&self, _region: &str, instance_id: &str) -> Result<ResourceMetrics, ClientError> {
        let instances = self.instances.lock().unwrap();
        instances
            .get(instance_id)
            .ok_or_else(|| ClientError::NotFound(instance_id.to_string()))?;
        // No real monitoring agent; report a stable mid-range reading.
        Ok(ResourceMetrics {
            cpu_utilization: Some(12.5),
            memory_utilization: Some(34.0),
        })
    }
}
