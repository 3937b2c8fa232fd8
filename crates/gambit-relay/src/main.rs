//! Gambit relay server.
//!
//! Pairs two participants per room and forwards their moves to each other
//! without validating them.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod room;
mod server;

use server::ServerState;

/// Relay pairing Gambit players and passing their moves through.
#[derive(Parser, Debug)]
#[command(name = "gambit-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to accept WebSocket connections on
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gambit relay on {}", args.addr);
    let state = Arc::new(ServerState::new());
    server::run_server(args.addr, state).await
}
