//! [crates/fleet-core/src/scheduler/mod.rs]
//! The persistent job scheduler: job payloads, the store port,
//! and the dispatch loop that ties them to `Services`.

pub mod job_store;
pub mod jobs;
pub mod runner;

pub use job_store::{enqueue_one_shot_idempotent, EnqueueOutcome, JobStore};
pub use jobs::{JobKind, JobStatus, ScheduledJob};
pub use runner::JobRunner;
