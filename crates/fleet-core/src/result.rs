//! [crates/fleet-core/src/result.rs]
//! Uniform envelope returned by every command and query handler, plus the
//! error taxonomy that maps onto it. The controller layer (out of
//! scope here) is expected to translate `OperationResult` into an HTTP
//! response without inspecting `CoreError` directly.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream authentication failed: {0}")]
    UpstreamAuth(String),

    #[error("upstream resource not found: {0}")]
    UpstreamNotFound(String),

    #[error("upstream rejected the operation: {0}")]
    UpstreamOperation(String),

    #[error("upstream call failed transiently: {0}")]
    UpstreamTransient(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::NotFound(_) => 400,
            CoreError::UpstreamAuth(_) => 400,
            CoreError::UpstreamNotFound(_) => 400,
            CoreError::UpstreamOperation(_) => 400,
            CoreError::UpstreamTransient(_) => 400,
            CoreError::Precondition(_) => 400,
            CoreError::Internal(_) => 500,
        }
    }

    /// Same taxonomy, but queries surface not-found as 404 rather than 400.
    pub fn query_status_code(&self) -> u16 {
        match self {
            CoreError::NotFound(_) => 404,
            other => other.status_code(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OperationResult<T: Serialize> {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl<T: Serialize> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status_code: 200,
            data: Some(data),
            detail: None,
        }
    }

    pub fn from_command_result(result: Result<T, CoreError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self {
                status_code: err.status_code(),
                data: None,
                detail: Some(err.to_string()),
            },
        }
    }

    pub fn from_query_result(result: Result<T, CoreError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self {
                status_code: err.query_status_code(),
                data: None,
                detail: Some(err.to_string()),
            },
        }
    }
}
