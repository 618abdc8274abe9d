pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod drip;
pub mod models;
pub mod tracking;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, ConfigError};
use crate::db::{DatabaseError, SqliteStore};
use crate::drip::{DripSequencer, HttpEmailSender, SendError};

/// Failures that stop the service from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Email sender error: {0}")]
    Sender(#[from] SendError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Initialise the tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Run the service until ctrl-c: open the store, start the periodic drip
/// tick and serve the API.
pub async fn run() -> Result<(), StartupError> {
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        version = config::APP_VERSION,
        timezone = %config.timezone,
        database = %config.database_path.display(),
        "{} starting",
        config::APP_NAME
    );
    if config.email.api_key.is_none() {
        tracing::warn!("PROTOCARE_EMAIL_API_KEY is not set; drip dispatches will fail until it is");
    }

    let store = Arc::new(SqliteStore::open(&config.database_path)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));
    let sender = HttpEmailSender::new(config.email.clone(), config.drip.dispatch_timeout)?;
    let sequencer = Arc::new(DripSequencer::new(
        store.clone(),
        Arc::new(sender),
        clock.clone(),
        config.drip.clone(),
    ));

    let ticker = drip::start_drip_ticker(sequencer.clone(), config.tick_interval);

    let ctx = api::ApiContext::new(store, sequencer, clock, config.cron_secret.clone());
    let server = api::start_api_server(ctx, config.api_addr).await?;
    tracing::info!(addr = %server.addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");

    server.stop().await;
    ticker.stop().await;
    Ok(())
}
