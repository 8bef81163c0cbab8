//! Tic-Tac-Toe Match Server
//!
//! Hosts authoritative tic-tac-toe matches over WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tictactoe::{
    init_module,
    network::{GameServer, ServerConfig},
    runtime::{MatchRegistry, SessionConfig},
    MATCH_LABEL, TICK_RATE, VERSION,
};

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "tictactoe-server", version, about = "Authoritative tic-tac-toe match server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:7350")]
    bind: SocketAddr,

    /// Maximum concurrent connections.
    #[arg(long, default_value_t = 1000)]
    max_connections: usize,

    /// Actions a match buffers between ticks.
    #[arg(long, default_value_t = 128)]
    input_queue_size: usize,

    /// Seconds a silent client stays connected.
    #[arg(long, default_value_t = 300)]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Tic-Tac-Toe Server v{}", VERSION);
    info!("Match: {} at {} ticks/s", MATCH_LABEL, TICK_RATE);

    let mut registry = MatchRegistry::new(SessionConfig {
        input_queue_size: args.input_queue_size,
        ..Default::default()
    });
    init_module(&mut registry).context("failed to load match module")?;

    let config = ServerConfig {
        bind_addr: args.bind,
        max_connections: args.max_connections,
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        ..Default::default()
    };
    let server = Arc::new(GameServer::new(config, registry));

    let running = server.clone();
    let mut task = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = &mut task => {
            result.context("server task panicked")??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Ctrl-C received, shutting down");
        }
    }

    server.shutdown();
    task.await.context("server task panicked")??;
    info!("Server stopped");
    Ok(())
}
