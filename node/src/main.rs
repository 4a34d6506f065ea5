mod api;
mod config;
mod rooms;
mod websocket;

use api::start_api_server;
use clap::Parser;
use config::NodeConfig;
use rooms::RelayState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use websocket::start_websocket_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeConfig::parse();
    info!("🚀 Starting simnet presence relay");

    let state = RelayState::new();

    let ws_addr = start_websocket_server(config.ws_addr, state.clone()).await?;
    info!("🌐 WebSocket relay ready at ws://{}/ws", ws_addr);

    let api_addr = config.api_addr;
    let api = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_addr, state).await {
            error!("API server error: {}", e);
        }
    });
    info!("🌐 Room inspector ready at http://{}/rooms/default", api_addr);

    tokio::select! {
        _ = api => {}
        _ = tokio::signal::ctrl_c() => {
            info!("👋 Shutting down");
        }
    }

    Ok(())
}
