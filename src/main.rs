//! TideKV - An In-Memory Key-Value Server
//!
//! This is the main entry point for the TideKV server.
//! Startup order: configuration, log replay, log open, then the accept loop.

use anyhow::Context;
use clap::Parser;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tidekv::commands::{CommandExecutor, CommandHandler};
use tidekv::config::{Cli, ServerConfig};
use tidekv::connection::{handle_connection, ConnectionStats};
use tidekv::persistence::{replay, AppendOnlyLog};
use tidekv::storage::Store;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
TideKV v{} - In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Listening on      {}
Eviction policy   {} (max {} entries)
Append-only log   {}

Use Ctrl+C to shutdown gracefully.
"#,
        tidekv::VERSION,
        config.bind_address(),
        config.eviction_policy,
        config.max_entries,
        config.aof_path.display(),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides the default level, e.g. RUST_LOG=tidekv=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = ServerConfig::load(&cli);

    let store = Arc::new(Store::new(config.eviction_policy, config.max_entries));
    info!(
        policy = %config.eviction_policy,
        max_entries = config.max_entries,
        "store initialized"
    );

    // Replay before the log is opened for appending so nothing replayed is
    // written back.
    let replayed = replay(&config.aof_path, Arc::clone(&store))
        .context("failed to replay append-only log")?;
    info!(keys = store.len(), applied = replayed.applied, "state restored");

    let log = Arc::new(
        AppendOnlyLog::open(&config.aof_path).context("failed to open append-only log")?,
    );

    let handler = CommandHandler::new(CommandExecutor::new(
        Arc::clone(&store),
        Some(Arc::clone(&log)),
    ));
    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("Listening on {}", config.bind_address());

    print_banner(&config);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, handler, config.idle_timeout, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    if let Err(e) = log.sync() {
        error!(error = %e, "failed to sync append-only log");
    }

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        idle_timeouts = stats.idle_timeouts.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        keys = store.len(),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    handler: CommandHandler,
    idle_timeout: Duration,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, idle_timeout, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
