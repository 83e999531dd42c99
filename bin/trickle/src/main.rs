mod cli;
mod config_loader;

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use trickle_common::utils::logging::init_logging;
use trickle_faucet::api::build_app;
use trickle_faucet::FaucetService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment file, if any
    dotenvy::dotenv().ok();

    // 2. Parse CLI
    let args = cli::Cli::parse();

    // 3. Load Config
    let config = config_loader::load_faucet_config(&args.config, &args)?;

    if let Some(cli::Commands::ShowConfig) = args.command {
        let value = config_loader::redacted(&config)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    // 4. Setup Logging; the guard flushes the file writer on exit
    let _log_guard = init_logging(&config.logging)?;

    info!("Starting Trickle faucet v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Server address: {}", config.server.addr);
    info!("  Auth provider: {:?}", config.auth.provider);
    info!("  Payout endpoint: {}", config.payout.api_url);
    info!("  Ledger backend: {:?}", config.ledger.backend);
    info!("  Environment: {}", config.error_tracking.environment);

    // 5. Initialize Service
    let service = Arc::new(
        FaucetService::from_config(&config).context("Failed to initialize faucet service")?,
    );
    info!("Faucet service initialized");

    // 6. Start Server
    let app = build_app(service.clone(), &config.server);
    let addr: SocketAddr = config
        .server
        .addr
        .parse()
        .with_context(|| format!("Invalid server address '{}'", config.server.addr))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down gracefully");
    if let Err(e) = service.ledger().flush() {
        error!("Failed to flush cooldown ledger: {}", e);
    }
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
