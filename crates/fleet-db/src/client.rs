//! [crates/fleet-db/src/client.rs]
//! Connection factory for the fleet document store. Wraps a `libsql::Database`
//! handle and hands out fresh `Connection`s; in `:memory:` mode keeps one
//! connection alive for the life of the process, since SQLite drops an
//! in-memory database the moment its last connection closes.

use crate::errors::DbError;
use crate::schema::apply_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct DbClient {
    database: Arc<Database>,
    _memory_anchor: Option<Arc<Connection>>,
}

impl DbClient {
    #[instrument(skip(auth_token))]
    pub async fn connect(url: &str, auth_token: Option<String>) -> Result<Self, DbError> {
        if url.is_empty() {
            return Err(DbError::ConfigurationError("database url is empty".into()));
        }

        let is_remote = url.starts_with("libsql://") || url.starts_with("https://");
        let is_memory = url.contains(":memory:");

        let database = if is_remote {
            let token = auth_token
                .ok_or_else(|| DbError::ConfigurationError("remote database requires an auth token".into()))?;
            Builder::new_remote(url.to_string(), token).build().await
        } else {
            Builder::new_local(url).build().await
        }
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        let database = Arc::new(database);

        let anchor = if is_memory {
            let conn = database
                .connect()
                .map_err(|e| DbError::ConnectionError(e.to_string()))?;
            apply_schema(&conn)
                .await
                .map_err(|e| DbError::ConnectionError(e.to_string()))?;
            info!("connected to in-memory database, schema applied on anchor connection");
            Some(Arc::new(conn))
        } else {
            let conn = database
                .connect()
                .map_err(|e| DbError::ConnectionError(e.to_string()))?;
            apply_schema(&conn)
                .await
                .map_err(|e| DbError::ConnectionError(e.to_string()))?;
            info!(url, "connected to database, schema applied");
            None
        };

        Ok(Self {
            database,
            _memory_anchor: anchor,
        })
    }

    pub fn connection(&self) -> Result<Connection, DbError> {
        self.database
            .connect()
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }
}
