//! SCALES — Channel loyalty currency and betting backend
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database, starts the passive-income loop, and serves the
//! HTTP API with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use scales::api::{self, AppState};
use scales::config::AppConfig;
use scales::hub::Hub;
use scales::jobs::{self, InMemoryPresence};
use scales::store::Database;

const BANNER: &str = r#"
 ____   ____    _    _     _____ ____
/ ___| / ___|  / \  | |   | ____/ ___|
\___ \| |     / _ \ | |   |  _| \___ \
 ___) | |___ / ___ \| |___| |___ ___) |
|____/ \____/_/   \_\_____|_____|____/

  Loyalty currency & betting backend
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_or_default("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        port = cfg.server.port,
        database = %cfg.database.url,
        reward_interval_secs = cfg.rewards.interval_secs,
        "SCALES starting up"
    );

    let db = Database::connect(&cfg.database.url, cfg.database.max_connections).await?;
    db.migrate().await?;

    let hub = Hub::default();
    let presence = Arc::new(InMemoryPresence::default());

    let reward_loop = jobs::spawn_reward_loop(
        db.clone(),
        hub.clone(),
        cfg.rewards.clone(),
        presence.clone(),
    );

    let state = AppState::new(db, hub, presence);
    tokio::select! {
        result = api::serve(state, cfg.server.port) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    reward_loop.abort();
    info!("SCALES shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scales=info"));

    let json_logging = std::env::var("SCALES_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
