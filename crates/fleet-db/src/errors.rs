//! [crates/fleet-db/src/errors.rs]
//! Persistence error catalog. One variant per failure class so callers in
//! `fleet-core` can map straight onto `CoreError` without inspecting strings.

use fleet_core::result::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database connection failed: {0}")]
    ConnectionError(String),

    #[error("database configuration invalid: {0}")]
    ConfigurationError(String),

    #[error("query failed: {0}")]
    QueryError(#[from] libsql::Error),

    #[error("row mapping failed: {0}")]
    MappingError(String),

    #[error("transaction failed")]
    TransactionError,

    #[error("worker not found")]
    WorkerNotFound,

    #[error("lab record not found")]
    LabRecordNotFound,

    #[error("scheduled job not found")]
    JobNotFound,

    #[error("instance_id already assigned to a different worker")]
    DuplicateInstanceId,
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::WorkerNotFound | DbError::LabRecordNotFound | DbError::JobNotFound => {
                CoreError::NotFound(err.to_string())
            }
            DbError::DuplicateInstanceId => CoreError::Validation(err.to_string()),
            other => CoreError::Internal(other.to_string()),
        }
    }
}
