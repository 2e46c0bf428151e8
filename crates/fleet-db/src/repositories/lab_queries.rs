//! [crates/fleet-db/src/repositories/lab_queries.rs]
//! SQL statements for the `lab_records` table, keyed by `(worker_id, lab_id)`.

pub const UPSERT_LAB_RECORD: &str = r#"
    INSERT INTO lab_records (lab_id, worker_id, document, state, title, last_synced_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT(worker_id, lab_id) DO UPDATE SET
        document = excluded.document,
        state = excluded.state,
        title = excluded.title,
        last_synced_at = excluded.last_synced_at
"#;

pub const DELETE_LAB_RECORD: &str = "DELETE FROM lab_records WHERE worker_id = ?1 AND lab_id = ?2";

pub const GET_LAB_RECORD: &str = "SELECT document FROM lab_records WHERE worker_id = ?1 AND lab_id = ?2";

pub const GET_LAB_RECORDS_FOR_WORKER: &str = "SELECT document FROM lab_records WHERE worker_id = ?1";
