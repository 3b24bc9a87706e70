use anyhow::Context;
use std::sync::Arc;

use crate::config::{config, AppConfig};
use crate::database::open_store;
use crate::services::TracingNotifier;
use crate::state::AppState;

/// Builds the same service graph the server uses. Notifications from CLI
/// runs are logged rather than posted.
pub async fn open_state() -> anyhow::Result<AppState> {
    let config: AppConfig = config().clone();
    let store = open_store(&config, false)
        .await
        .context("failed to open the console store")?;
    Ok(AppState::new(config, store, Arc::new(TracingNotifier)))
}
