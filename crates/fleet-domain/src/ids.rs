//! [crates/fleet-domain/src/ids.rs]
//! Stable identifiers for fleet entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque 128-bit identifier for a worker aggregate. Assigned on creation, immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lab identifiers come from the lab HTTPS API and are opaque strings, not UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabId(pub String);

impl fmt::Display for LabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for LabId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LabId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
