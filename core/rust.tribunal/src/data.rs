use std::fmt::Debug;
use std::sync::Arc;

use crate::appeals::AppealStore;
use crate::platform::{AuditLogger, ChatPlatform};
use crate::store::PunishmentStore;

/// This struct stores base/standard panel data, which is stored and accessible in all command invocations
#[derive(Clone)]
pub struct Data {
    pub config: Arc<config::Config>,
    pub punishments: Arc<PunishmentStore>,
    pub appeals: Arc<AppealStore>,
    pub platform: Arc<dyn ChatPlatform>,
    pub audit: Arc<dyn AuditLogger>,
}

impl Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &"Arc<config::Config>")
            .field("punishments", &"Arc<PunishmentStore>")
            .field("appeals", &"Arc<AppealStore>")
            .field("platform", &"Arc<dyn ChatPlatform>")
            .field("audit", &"Arc<dyn AuditLogger>")
            .finish()
    }
}

impl Data {
    /// Builds the shared state from a loaded configuration, with the
    /// ledger stores rooted at the storage section's paths.
    pub fn from_config(
        config: config::Config,
        platform: Arc<dyn ChatPlatform>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        let punishments = Arc::new(PunishmentStore::new(&config.storage.punishments));
        let appeals = Arc::new(AppealStore::new(&config.storage.appeals));

        Self {
            config: Arc::new(config),
            punishments,
            appeals,
            platform,
            audit,
        }
    }
}
