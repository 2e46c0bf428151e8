//! [crates/fleet-db/src/repositories/settings_repository.rs]
//! `SettingsRepository` adapter: one hot-reloadable row. Falls back to domain
//! defaults if the row hasn't been written yet, so a fresh database boots
//! without a seeding step.

use crate::errors::DbError;
use crate::DbClient;
use async_trait::async_trait;
use chrono::Utc;
use fleet_core::repositories::SettingsRepository;
use fleet_core::result::CoreError;
use fleet_domain::SystemSettings;
use libsql::params;
use tracing::instrument;

const GET_SETTINGS: &str = "SELECT document FROM system_settings WHERE id = 1";
const UPSERT_SETTINGS: &str = r#"
    INSERT INTO system_settings (id, document, updated_at) VALUES (1, ?1, ?2)
    ON CONFLICT(id) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at
"#;

pub struct DbSettingsRepository {
    client: DbClient,
}

impl DbSettingsRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SettingsRepository for DbSettingsRepository {
    #[instrument(skip(self))]
    async fn get(&self) -> Result<SystemSettings, CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let mut rows = conn.query(GET_SETTINGS, ()).await.map_err(DbError::from)?;
        match rows.next().await.map_err(DbError::from)? {
            Some(row) => {
                let document: String = row.get(0).map_err(DbError::from)?;
                serde_json::from_str(&document)
                    .map_err(|e| CoreError::from(DbError::MappingError(e.to_string())))
            }
            None => Ok(SystemSettings::default()),
        }
    }

    #[instrument(skip(self, settings))]
    async fn update(&self, settings: &SystemSettings) -> Result<(), CoreError> {
        let conn = self.client.connection().map_err(DbError::from)?;
        let document = serde_json::to_string(settings).map_err(|e| DbError::MappingError(e.to_string()))?;
        conn.execute(UPSERT_SETTINGS, params![document, Utc::now().to_rfc3339()])
            .await
            .map_err(DbError::from)?;
        Ok(())
    }
}
