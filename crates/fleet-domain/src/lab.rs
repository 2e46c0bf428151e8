//! [crates/fleet-domain/src/lab.rs]
//! `LabRecord` — a lab hosted on a worker's CML instance, mirrored from the lab
//! HTTPS API. Not an aggregate root in its own right: mutated only through
//! `WorkerAggregate`-scoped operations, keyed by `(worker_id, lab_id)`.

use crate::ids::{LabId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabState {
    Defined,
    Booted,
    Started,
    Stopped,
    Unknown,
}

impl LabState {
    pub fn from_lab_service_state(state: &str) -> Self {
        match state {
            "DEFINED_ON_CORE" => LabState::Defined,
            "BOOTED" => LabState::Booted,
            "STARTED" => LabState::Started,
            "STOPPED" => LabState::Stopped,
            _ => LabState::Unknown,
        }
    }
}

/// One entry in a lab's bounded operation history ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabOperation {
    pub timestamp: DateTime<Utc>,
    pub previous_state: LabState,
    pub new_state: LabState,
    pub changed_fields: Vec<String>,
}

/// Ring buffer capped at 50 entries.
const MAX_OPERATION_HISTORY: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabRecord {
    pub lab_id: LabId,
    pub worker_id: WorkerId,
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub state: LabState,
    pub owner_username: Option<String>,
    pub owner_full_name: Option<String>,
    pub node_count: u32,
    pub link_count: u32,
    pub groups: Vec<String>,
    pub lab_service_created_at: Option<DateTime<Utc>>,
    pub lab_service_modified_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
    pub operation_history: Vec<LabOperation>,
}

impl LabRecord {
    pub fn new(
        lab_id: LabId,
        worker_id: WorkerId,
        title: String,
        state: LabState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            lab_id,
            worker_id,
            title,
            description: None,
            notes: None,
            state,
            owner_username: None,
            owner_full_name: None,
            node_count: 0,
            link_count: 0,
            groups: Vec::new(),
            lab_service_created_at: None,
            lab_service_modified_at: None,
            first_seen_at: now,
            last_synced_at: now,
            operation_history: Vec::new(),
        }
    }

    /// Applies a sync snapshot from the lab API, diffing field-by-field to
    /// produce the `changed_fields` list recorded in the operation history.
    /// Returns the changed field names, empty when nothing moved.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_sync(
        &mut self,
        title: String,
        description: Option<String>,
        notes: Option<String>,
        state: LabState,
        owner_username: Option<String>,
        owner_full_name: Option<String>,
        node_count: u32,
        link_count: u32,
        groups: Vec<String>,
        lab_service_modified_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        macro_rules! diff_field {
            ($field:ident, $new:expr) => {
                if self.$field != $new {
                    changed.push(stringify!($field).to_string());
                    self.$field = $new;
                }
            };
        }
        diff_field!(title, title);
        diff_field!(description, description);
        diff_field!(notes, notes);
        diff_field!(owner_username, owner_username);
        diff_field!(owner_full_name, owner_full_name);
        diff_field!(node_count, node_count);
        diff_field!(link_count, link_count);
        diff_field!(groups, groups);
        diff_field!(lab_service_modified_at, lab_service_modified_at);

        let previous_state = self.state;
        if previous_state != state {
            changed.push("state".to_string());
            self.push_operation(previous_state, state, changed.clone(), now);
            self.state = state;
        }
        self.last_synced_at = now;
        changed
    }

    fn push_operation(
        &mut self,
        previous_state: LabState,
        new_state: LabState,
        changed_fields: Vec<String>,
        timestamp: DateTime<Utc>,
    ) {
        self.operation_history.push(LabOperation {
            timestamp,
            previous_state,
            new_state,
            changed_fields,
        });
        if self.operation_history.len() > MAX_OPERATION_HISTORY {
            let overflow = self.operation_history.len() - MAX_OPERATION_HISTORY;
            self.operation_history.drain(0..overflow);
        }
    }
}

/// Grouping of a worker's lab records keyed by lab id, as surfaced by queries.
pub type LabRecordsByLab = HashMap<String, LabRecord>;
