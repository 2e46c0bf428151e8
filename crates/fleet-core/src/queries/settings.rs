//! [crates/fleet-core/src/queries/settings.rs]
//! GetSystemSettings.

use crate::context::Services;
use crate::result::CoreError;
use fleet_domain::SystemSettings;
use tracing::instrument;

#[instrument(skip(services))]
pub async fn get_system_settings(services: &Services) -> Result<SystemSettings, CoreError> {
    services.settings.get().await
}
