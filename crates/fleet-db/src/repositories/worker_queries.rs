//! [crates/fleet-db/src/repositories/worker_queries.rs]
//! SQL statements for the `workers` table. The full aggregate is stored as a
//! JSON `document`; a handful of scalar columns are mirrored out for indexed
//! lookups (status, region, instance_id).

pub const INSERT_WORKER: &str = r#"
    INSERT INTO workers (id, document, status, region, instance_id, instance_type, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#;

pub const UPDATE_WORKER: &str = r#"
    UPDATE workers
    SET document = ?2, status = ?3, region = ?4, instance_id = ?5, instance_type = ?6, updated_at = ?7
    WHERE id = ?1
"#;

pub const DELETE_WORKER: &str = "DELETE FROM workers WHERE id = ?1";

pub const GET_WORKER_BY_ID: &str = "SELECT document FROM workers WHERE id = ?1";

pub const GET_WORKER_BY_INSTANCE_ID: &str = "SELECT document FROM workers WHERE instance_id = ?1";

pub const GET_WORKERS_BY_STATUS: &str = "SELECT document FROM workers WHERE status = ?1";

pub const GET_WORKERS_BY_REGION: &str = "SELECT document FROM workers WHERE region = ?1";

pub const GET_ACTIVE_WORKERS: &str = "SELECT document FROM workers WHERE status NOT IN ('Terminated')";
