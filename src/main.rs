//! oddsheet — periodic odds fetcher.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! registers one scheduled group per configured sheet, optionally serves
//! the dashboard, and runs until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use oddsheet::config;
use oddsheet::dashboard;
use oddsheet::engine::scheduler::Scheduler;
use oddsheet::fetch::http::HttpFetcher;
use oddsheet::storage::sheet_file::SheetFileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("ODDSHEET_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    info!(
        name = %cfg.app.name,
        groups = cfg.groups.len(),
        store = %cfg.store.path.display(),
        "oddsheet starting up"
    );

    // -- Collaborators ---------------------------------------------------

    let api_key = cfg.api_key()?;
    if api_key.is_none() {
        info!("No odds API key configured, requests are sent unauthenticated");
    }
    let fetcher = HttpFetcher::new(
        cfg.fetch.base_url.clone(),
        cfg.fetch_timeout(),
        &cfg.fetch.user_agent,
        api_key,
    )?;

    if let Some(dir) = cfg.store.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
    }
    let store = SheetFileStore::new(cfg.store.path.clone());

    // -- Scheduler -------------------------------------------------------

    let mut scheduler = Scheduler::new(Arc::new(fetcher), Arc::new(store));
    for spec in cfg.group_specs() {
        scheduler
            .register(spec)
            .context("Failed to register group")?;
    }
    if cfg.groups.is_empty() {
        warn!("No groups configured, nothing will be fetched");
    }
    let scheduler = Arc::new(scheduler);

    let server = if cfg.dashboard.enabled {
        Some(dashboard::spawn_dashboard(scheduler.clone(), cfg.dashboard.port).await?)
    } else {
        None
    };

    info!("Running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received.");

    if let Some(server) = server {
        server.abort();
    }
    scheduler.shutdown().await;

    for status in scheduler.statuses() {
        info!(group = %status.group_id, runs = status.run_id, state = %status.state, "Final status");
    }
    info!("oddsheet shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("oddsheet=info"));

    let json_logging = std::env::var("ODDSHEET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
