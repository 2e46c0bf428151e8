//! [crates/fleet-db/src/lib.rs]
//! libSQL-backed persistence for the CML fleet engine. Implements the
//! repository and job-store ports declared in `fleet-core` against a Turso
//! (or local SQLite-compatible) document store.

pub mod client;
pub mod errors;
pub mod job_store;
pub mod repositories;
pub mod schema;

pub use client::DbClient;
pub use errors::DbError;
pub use job_store::DbJobStore;
pub use repositories::{DbLabRecordRepository, DbSettingsRepository, DbWorkerRepository};
