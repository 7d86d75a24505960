//! Accel Daemon - Accelerator resource agent
//!
//! Periodically reconciles the host's accelerators with the inventory
//! service and publishes their capabilities to the placement service.

use accel_agent::{
    AgentConfig, AgentManager, FileDiscovery, HttpInventoryClient, ReconcileEngine, Scheduler,
};
use accel_catalog::{HttpImageCatalog, ImageCache};
use accel_placement::HttpPlacementClient;
use accel_types::{Gates, StaticTokenSource, TokenSource};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Accel Daemon CLI
#[derive(Parser)]
#[command(name = "acceld")]
#[command(about = "Accel Daemon - Accelerator resource agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ACCEL_CONFIG")]
    config: Option<String>,

    /// Host name, overriding configuration
    #[arg(long, env = "ACCEL_HOST")]
    host: Option<String>,

    /// Log level, overriding configuration
    #[arg(long, env = "ACCEL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ACCEL_LOG_JSON")]
    json: bool,

    /// Run a single reconciliation and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config =
        AgentConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Override with CLI args
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        "Starting accelerator agent"
    );

    let manager = build_manager(&config)?;

    if cli.once {
        let report = manager.update_available_resource().await?;
        tracing::info!(
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            failures = report.failures.len(),
            "Single run finished"
        );
        return Ok(());
    }

    let (scheduler, trigger_rx) = Scheduler::new(config.scheduler.clone(), manager);
    tokio::select! {
        result = scheduler.clone().start(trigger_rx) => result?,
        _ = shutdown_signal() => scheduler.stop().await,
    }

    tracing::info!("Accelerator agent shutting down");
    Ok(())
}

fn build_manager(config: &AgentConfig) -> anyhow::Result<AgentManager> {
    let timeout = Duration::from_secs(config.services.request_timeout_secs);
    let gates = Gates::new();

    let tokens: Arc<dyn TokenSource> = match config.auth.session() {
        Some(session) => Arc::new(StaticTokenSource::new(session)),
        None => {
            tracing::warn!("No credentials configured, image and placement sync disabled");
            Arc::new(StaticTokenSource::empty())
        }
    };

    let catalog = HttpImageCatalog::new(timeout).context("Failed to build image catalog client")?;
    let images = Arc::new(ImageCache::with_gate(
        Arc::new(catalog),
        tokens.clone(),
        gates.images.clone(),
    ));

    let inventory = HttpInventoryClient::new(&config.services.inventory_url, timeout)
        .context("Failed to build inventory client")?;
    let placement = HttpPlacementClient::new(timeout).context("Failed to build placement client")?;
    let discovery = FileDiscovery::new(config.discovery.inventory_path.clone());

    let engine = ReconcileEngine::new(
        config.host.clone(),
        Arc::new(discovery),
        Arc::new(inventory),
        images,
        Arc::new(placement),
        tokens,
    )
    .with_gate(gates.resources.clone());

    Ok(AgentManager::new(Arc::new(engine)))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
