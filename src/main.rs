use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ops_console_api::config::AppConfig;
use ops_console_api::database::open_store;
use ops_console_api::services::notifier_from_config;
use ops_console_api::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SECURITY_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ops_console_api::config::config().clone();
    info!("Starting operations console API in {:?} mode", config.environment);
    ensure_secret(&config)?;

    let store = open_store(&config, config.database.run_migrations)
        .await
        .context("failed to open the console store")?;
    let notifier = notifier_from_config(&config.notifications).context("invalid notification config")?;
    let state = AppState::new(config.clone(), store, notifier);

    spawn_background_jobs(&state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Operations console API listening on http://{}", bind_addr);

    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;
    Ok(())
}

fn ensure_secret(config: &AppConfig) -> anyhow::Result<()> {
    if config.security.jwt_secret.trim().is_empty() {
        anyhow::bail!("SECURITY_JWT_SECRET must be set outside development");
    }
    Ok(())
}

fn spawn_background_jobs(state: &AppState) {
    let cache = state.permission_cache().clone();
    let ttl = cache.ttl();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired().await;
            if purged > 0 {
                tracing::debug!("Purged {} expired permission decisions", purged);
            }
        }
    });

    let interval = state.config.approval.sweep_interval_secs;
    if interval == 0 {
        info!("Approval expiry sweep loop disabled");
        return;
    }

    let approvals = state.approvals.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval));
        loop {
            ticker.tick().await;
            if let Err(e) = approvals.process_approval_expiry().await {
                error!("Scheduled approval expiry sweep failed: {}", e);
            }
        }
    });
    info!("Approval expiry sweep scheduled every {}s", interval);
}
