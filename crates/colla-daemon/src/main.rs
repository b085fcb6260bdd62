//! colla-daemon: collateral oracle and epoch reward router service.
//!
//! Single OS process running a Tokio async runtime. Feeders, operators and
//! vaults talk to the daemon via JSON-RPC over a Unix socket. All state is
//! held in memory and mirrored to SQLite, from which it is rebuilt on start.

mod attest;
mod commands;
mod config;
mod engine;
mod epoch;
mod rpc;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::DaemonConfig;
use crate::engine::Engine;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Oracle, router and treasury behind one lock; every call runs to
    /// completion before the next starts.
    pub engine: Mutex<Engine>,
    /// Configuration.
    pub config: DaemonConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("colla={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("Colla daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database and rebuild state
    let db_path = data_dir.join("colla.db");
    let conn = colla_db::open(&db_path)?;
    let engine = Engine::open(conn, &config)?;
    info!(
        validators = engine.oracle().validator_count(),
        genesis = config.epochs.genesis_timestamp,
        epoch_secs = config.epochs.epoch_duration_secs,
        "state restored from {:?}",
        db_path
    );

    let state = Arc::new(DaemonState {
        engine: Mutex::new(engine),
        config,
    });

    // 3. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!(
        feeders = state.config.roles.feeders.len(),
        admins = state.config.roles.admins.len(),
        "Starting JSON-RPC server on {:?}",
        socket_path
    );

    // 4. Run the RPC server until shutdown
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
