//! Prometheus exporter for Azure DevOps.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use azdo_exporter::{Exporter, ExporterConfig};

/// Prometheus exporter for Azure DevOps.
#[derive(Parser, Debug)]
#[command(name = "azdo-exporter")]
#[command(about = "Export Azure DevOps metrics for Prometheus")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,

    /// Azure DevOps organisation name.
    #[arg(long, env = "AZURE_DEVOPS_ORGANISATION")]
    organisation: Option<String>,

    /// Personal access token.
    #[arg(long, env = "AZURE_DEVOPS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// File containing the access token.
    #[arg(long, env = "AZURE_DEVOPS_ACCESS_TOKEN_FILE")]
    access_token_file: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // Command line and environment take precedence over the file
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(organisation) = args.organisation {
        config.azure_devops.organisation = organisation;
    }
    if let Some(token) = args.access_token {
        config.azure_devops.access_token = Some(token);
    }
    if let Some(path) = args.access_token_file {
        config.azure_devops.access_token_file = Some(path);
    }

    azdo_common::init_tracing(&config.logging)?;

    let settings = config.resolve()?;

    info!(
        organisation = %settings.organisation,
        api_version = %settings.client.api_version,
        "Starting Azure DevOps exporter"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let exporter = Exporter::start(&settings, shutdown_rx)?;

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    let client = Arc::clone(exporter.client());
    let registry = Arc::clone(exporter.registry());
    exporter.join(Duration::from_secs(5)).await;

    // Print final stats
    let stats = client.stats();
    info!(
        requests = stats.requests,
        failures = stats.failures,
        retries = stats.retries,
        series_count = registry.series_count(),
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
