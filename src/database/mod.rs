pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{
    AccessRequestResolution, AccessRequestStore, AuditStore, LeaderAssignment, PermissionStore, PermissionWrite,
    RoleAssignment, Store, UnitDeactivation, UnitStore, UnitUpdate, UserStore,
};

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, Environment};

/// Opens the configured backend. Development without `DATABASE_URL` falls
/// back to the in-memory store; every other environment requires Postgres.
pub async fn open_store(config: &AppConfig, run_migrations: bool) -> Result<Arc<dyn Store>, DatabaseError> {
    if config.database.url.is_none() && config.environment == Environment::Development {
        warn!("DATABASE_URL not set, using the in-memory store (data is lost on exit)");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let manager = DatabaseManager::connect(&config.database).await?;
    if run_migrations {
        manager.migrate().await?;
    }
    info!("Using Postgres store");
    Ok(Arc::new(PgStore::from_manager(&manager)))
}
