//! [crates/fleet-db/src/repositories/mod.rs]
//! Concrete libSQL-backed adapters for the repository ports declared in
//! `fleet-core`.

pub(crate) mod job_queries;
mod lab_queries;
mod worker_queries;

pub mod lab_repository;
pub mod settings_repository;
pub mod worker_repository;

pub use lab_repository::DbLabRecordRepository;
pub use settings_repository::DbSettingsRepository;
pub use worker_repository::DbWorkerRepository;
