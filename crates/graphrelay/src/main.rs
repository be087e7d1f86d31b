//! `graphrelay` - SMTP to Microsoft Graph relay
//!
//! Accepts mail from legacy SMTP clients on a local port and sends each
//! message through the Graph `sendMail` API as the envelope sender.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use graphrelay_core::store::{ABANDON_THRESHOLD, RECLAIM_INTERVAL};
use graphrelay_core::{Config, GraphClient, RelayBackend, TransactionStore};
use graphrelay_smtp::Server;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    init_tracing(args.debug || config.service.debug);

    info!(
        config = %args.config.display(),
        tenant = %config.graph.tenant_id,
        "Starting graphrelay"
    );

    let graph = GraphClient::from_config(&config.graph).context("Failed to create Graph client")?;
    let store = Arc::new(TransactionStore::new());
    let shutdown = CancellationToken::new();
    let reclaimer = store.spawn_reclaimer(RECLAIM_INTERVAL, ABANDON_THRESHOLD, shutdown.child_token());

    let backend = RelayBackend::new(Arc::clone(&store), graph);
    let server = Server::new(backend, config.server.smtp_config());

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    tokio::spawn(watch_ctrl_c(shutdown.clone()));

    let served = server.serve(listener, shutdown.clone()).await;
    shutdown.cancel();
    if let Err(e) = reclaimer.await {
        error!(error = %e, "Reclaimer task failed");
    }

    served.context("SMTP server failed")?;
    info!(pending = store.len(), "graphrelay stopped");
    Ok(())
}

fn init_tracing(debug: bool) {
    let fallback = if debug {
        "graphrelay=debug,graphrelay_core=debug,graphrelay_smtp=debug,graphrelay_oauth=debug"
    } else {
        "graphrelay=info,graphrelay_core=info,graphrelay_smtp=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Received Ctrl+C, shutting down");
    shutdown.cancel();
}
