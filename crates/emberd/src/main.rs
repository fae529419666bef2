use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use emberd::Config;
use emberd::Engine;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Home automation daemon for BloomSky cameras and Radio Thermostats
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Config files, earlier files take precedence for sections defined twice
    #[arg(short, long = "config", default_value = "emberd.toml")]
    config: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, warnings) = Config::load(&cli.config).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("emberd {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded config from: {:?}", cli.config);
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    let mut engine = Engine::new();
    engine.register_integrations_from_config(&config);
    if engine.integration_count() == 0 {
        tracing::warn!("No integrations configured");
    }
    let engine = Arc::new(engine);

    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.run().await {
                tracing::error!("Engine stopped: {}", e);
            }
        })
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let api_task = if config.api.enabled {
        let engine = engine.clone();
        let listen = config.api.listen.clone();
        let port = config.api.port;
        Some(tokio::spawn(async move {
            if let Err(e) = emberd::api::serve(engine, listen, port, shutdown_rx).await {
                tracing::error!("HTTP API server failed: {:#}", e);
            }
        }))
    } else {
        tracing::info!("HTTP API disabled");
        None
    };

    tracing::info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    let _ = shutdown_tx.send(());
    if let Some(task) = api_task {
        if let Err(e) = task.await {
            tracing::error!("HTTP API task panicked: {}", e);
        }
    }

    tracing::info!("Stopping integrations");
    engine.abort_integrations();
    engine_task.abort();

    tracing::info!("emberd shutdown complete");
    Ok(())
}
