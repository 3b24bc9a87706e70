use anyhow::Context;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::DatabaseManager;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let manager = DatabaseManager::connect(&config().database)
        .await
        .context("migrations need DATABASE_URL to point at Postgres")?;
    manager.migrate().await?;
    manager.close().await;

    output_success(&output_format, "Migrations applied", Some(json!({ "migrated": true })))
}
