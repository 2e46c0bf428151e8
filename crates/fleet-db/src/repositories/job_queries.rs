//! [crates/fleet-db/src/repositories/job_queries.rs]
//! SQL statements for the `scheduled_jobs` table.

pub const UPSERT_JOB: &str = r#"
    INSERT INTO scheduled_jobs (id, kind, payload, status, run_at, recurrence_seconds, last_run_at, last_error, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
    ON CONFLICT(id) DO UPDATE SET
        kind = excluded.kind,
        payload = excluded.payload,
        status = excluded.status,
        run_at = excluded.run_at,
        recurrence_seconds = excluded.recurrence_seconds,
        last_run_at = excluded.last_run_at,
        last_error = excluded.last_error,
        updated_at = excluded.updated_at
"#;

pub const GET_JOB: &str = r#"
    SELECT id, payload, run_at, recurrence_seconds, status, last_run_at, last_error
    FROM scheduled_jobs WHERE id = ?1
"#;

pub const GET_DUE_JOBS: &str = r#"
    SELECT id, payload, run_at, recurrence_seconds, status, last_run_at, last_error
    FROM scheduled_jobs WHERE status = 'Pending' AND run_at <= ?1
"#;

pub const DELETE_JOB: &str = "DELETE FROM scheduled_jobs WHERE id = ?1";
