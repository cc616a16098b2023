//! scrape - polls JSON endpoints and container statistics and writes them to
//! InfluxDB.

use anyhow::Result;
use clap::Parser;
use scrape::{app::App, cli::Cli, config::Config};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            // Logging is not configured yet.
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("scrape starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Log Metrics: {}", config.log_metrics);
    if config.log_metrics {
        info!("Log Metrics Interval: {}s", config.log_metrics_interval_seconds);
    }
    info!("Database URL: {}", config.global.database_url);
    info!("Configured Tasks: {}", config.insert.len());
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = match App::builder(config).build(shutdown_rx).await {
        Ok(app) => app,
        Err(err) => {
            error!("Failed to start: {:#}", err);
            std::process::exit(1);
        }
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Ctrl-C received, initiating shutdown...");
        let _ = shutdown_tx.send(true);
    });

    app.run().await?;
    info!("scrape has shut down.");
    Ok(())
}
