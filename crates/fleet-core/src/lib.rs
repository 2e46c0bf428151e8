//! [crates/fleet-core/src/lib.rs]
//! Fleet worker lifecycle and data-refresh engine: the core business logic,
//! free of any concrete infrastructure dependency.
//! `fleet-db` and `fleet-clients` depend on this crate to implement the ports
//! declared here (`repositories`, `clients`, `scheduler::job_store`,
//! `relay::PubSubBus`); `apps/fleet-orchestrator` wires the adapters together
//! into a running process.

pub mod clients;
pub mod commands;
pub mod context;
pub mod idle;
pub mod metrics_service;
pub mod queries;
pub mod relay;
pub mod repositories;
pub mod result;
pub mod scheduler;
pub mod telemetry;
pub mod throttle;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::Services;
pub use result::{CoreError, OperationResult};
