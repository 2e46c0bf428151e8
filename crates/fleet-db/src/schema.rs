//! [crates/fleet-db/src/schema.rs]
//! Schema definitions, applied in tiers: base tables, then additive column
//! migrations tolerant of re-application, then indexes. Mirrors how earlier
//! releases of this engine grew the schema without a migration framework.

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

const BASE_TABLES: &[(&str, &str)] = &[
    ("TABLE_WORKERS", r#"
        CREATE TABLE IF NOT EXISTS workers (
            id TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            status TEXT NOT NULL,
            region TEXT NOT NULL,
            instance_id TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_LAB_RECORDS", r#"
        CREATE TABLE IF NOT EXISTS lab_records (
            lab_id TEXT NOT NULL,
            worker_id TEXT NOT NULL,
            document TEXT NOT NULL,
            state TEXT NOT NULL,
            last_synced_at DATETIME NOT NULL,
            PRIMARY KEY (worker_id, lab_id)
        );
    "#),
    ("TABLE_SYSTEM_SETTINGS", r#"
        CREATE TABLE IF NOT EXISTS system_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            document TEXT NOT NULL,
            updated_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_SCHEDULED_JOBS", r#"
        CREATE TABLE IF NOT EXISTS scheduled_jobs (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            run_at DATETIME NOT NULL,
            recurrence_seconds INTEGER,
            last_run_at DATETIME,
            last_error TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );
    "#),
];

const EVOLUTIONS: &[(&str, &str)] = &[
    ("WORKER_INSTANCE_INDEX_HINT", "ALTER TABLE workers ADD COLUMN instance_type TEXT"),
    ("LAB_RECORDS_TITLE_HINT", "ALTER TABLE lab_records ADD COLUMN title TEXT"),
];

const INDEXES: &[(&str, &str)] = &[
    ("IDX_WORKERS_STATUS", "CREATE INDEX IF NOT EXISTS idx_workers_status ON workers(status);"),
    ("IDX_WORKERS_REGION", "CREATE INDEX IF NOT EXISTS idx_workers_region ON workers(region);"),
    (
        "IDX_WORKERS_INSTANCE_ID",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_workers_instance_id ON workers(instance_id) WHERE instance_id IS NOT NULL;",
    ),
    ("IDX_LAB_RECORDS_WORKER", "CREATE INDEX IF NOT EXISTS idx_lab_records_worker ON lab_records(worker_id);"),
    ("IDX_JOBS_STATUS_RUN_AT", "CREATE INDEX IF NOT EXISTS idx_jobs_status_run_at ON scheduled_jobs(status, run_at);"),
    ("IDX_JOBS_KIND", "CREATE INDEX IF NOT EXISTS idx_jobs_kind ON scheduled_jobs(kind);"),
];

#[instrument(skip(connection))]
pub async fn apply_schema(connection: &Connection) -> Result<()> {
    info!("applying fleet-db schema");
    create_tables(connection).await?;
    apply_evolutions(connection).await?;
    create_indexes(connection).await?;
    info!("schema up to date");
    Ok(())
}

async fn create_tables(db: &Connection) -> Result<()> {
    for (name, sql) in BASE_TABLES {
        debug!(table = name, "creating table");
        db.execute(sql, ())
            .await
            .with_context(|| format!("failed to create table {name}"))?;
    }
    Ok(())
}

async fn apply_evolutions(db: &Connection) -> Result<()> {
    for (name, sql) in EVOLUTIONS {
        match db.execute(sql, ()).await {
            Ok(_) => debug!(migration = name, "applied"),
            Err(e) => {
                let message = e.to_string();
                if message.contains("duplicate column name") {
                    debug!(migration = name, "already applied");
                } else {
                    warn!(migration = name, error = %message, "migration skipped");
                }
            }
        }
    }
    Ok(())
}

async fn create_indexes(db: &Connection) -> Result<()> {
    for (name, sql) in INDEXES {
        debug!(index = name, "creating index");
        db.execute(sql, ())
            .await
            .with_context(|| format!("failed to create index {name}"))?;
    }
    Ok(())
}
