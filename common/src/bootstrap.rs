// Bootstrap utilities shared by the client and worker binaries

use crate::config::Settings;
use crate::queue::NatsClient;
use crate::telemetry;
use anyhow::{Context, Result};
use tracing::info;

/// Load and validate settings
///
/// # Errors
/// Returns error if a configuration source is malformed or validation fails
pub fn load_settings() -> Result<Settings> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Initialize logging and, when a port is configured, the metrics exporter
pub fn init_observability(settings: &Settings) -> Result<()> {
    telemetry::init_logging(&settings.observability.log_level)?;
    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }
    Ok(())
}

/// Connect to NATS and make sure the job stream exists
/// Used by: Client, Worker
///
/// # Errors
/// Returns error if the connection or stream initialization fails
#[tracing::instrument(skip(settings), fields(url = %settings.nats.url))]
pub async fn init_nats_client(settings: &Settings) -> Result<NatsClient> {
    info!("Initializing NATS client");

    let nats_client = NatsClient::new(settings.nats.clone())
        .await
        .context("Failed to initialize NATS client")?;

    nats_client
        .initialize_stream()
        .await
        .context("Failed to initialize job stream")?;

    info!("NATS client initialized");
    Ok(nats_client)
}
