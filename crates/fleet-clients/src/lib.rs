//! [crates/fleet-clients/src/lib.rs]
//! Concrete adapters for the ports declared in `fleet_core::clients`. The
//! cloud compute SDK integration is out of scope, so `fake_cloud`
//! ships a deterministic in-memory stand-in; `lab_api` is a real HTTPS client
//! for the lab service.

pub mod fake_cloud;
pub mod lab_api;

pub use fake_cloud::FakeCloudProvider;
pub use lab_api::{LabApiConfig, ReqwestLabApiClient};
