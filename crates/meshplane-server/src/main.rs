//! meshplaned — WebSocket control plane daemon.

mod config;
mod ws;

use clap::Parser;
use config::ServerConfig;
use meshplane_core::{ControlPlane, MemoryAuth};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "meshplaned",
    about = "Service mesh control plane: registration, discovery and message delivery over WebSocket"
)]
struct Args {
    /// Address to listen on (overrides MESHPLANE_PORT).
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Service name reported in protocol error messages
    /// (overrides MESHPLANE_SERVICE_NAME).
    #[arg(long)]
    service_name: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut config = ServerConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(name) = args.service_name {
        config.service_name = name;
    }

    let plane = ControlPlane::new(config.service_name.clone(), Arc::new(MemoryAuth::new()));
    let (_addr, handle) = ws::start(config, plane).await?;
    handle.await?;
    Ok(())
}
