//! [crates/fleet-core/src/context.rs]
//! Service locator handed to command/query handlers and to the job runner:
//! a bundle of `Arc`-wrapped collaborators constructed once at startup and
//! cloned cheaply per request. This is the one piece of intentional
//! global-ish state, passed explicitly rather than reached for via a
//! singleton.

use crate::clients::{CloudProvider, LabApiClient};
use crate::relay::EventRelay;
use crate::repositories::{LabRecordRepository, SettingsRepository, WorkerRepository};
use crate::scheduler::job_store::JobStore;
use crate::throttle::RefreshThrottle;
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub workers: Arc<dyn WorkerRepository>,
    pub labs: Arc<dyn LabRecordRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub jobs: Arc<dyn JobStore>,
    pub cloud: Arc<dyn CloudProvider>,
    pub lab_api: Arc<dyn LabApiClient>,
    pub relay: Arc<EventRelay>,
    pub throttle: Arc<RefreshThrottle>,
}
