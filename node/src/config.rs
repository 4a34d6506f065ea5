use clap::Parser;
use std::net::SocketAddr;

pub const DEFAULT_WS_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_API_ADDR: &str = "127.0.0.1:8080";

/// Listen addresses for the presence relay.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "simnet-node",
    version,
    about = "Presence and signaling relay for the network simulator"
)]
pub struct NodeConfig {
    /// WebSocket listen address.
    #[arg(long, env = "SIMNET_WS_ADDR", default_value = DEFAULT_WS_ADDR)]
    pub ws_addr: SocketAddr,

    /// HTTP inspector listen address.
    #[arg(long, env = "SIMNET_API_ADDR", default_value = DEFAULT_API_ADDR)]
    pub api_addr: SocketAddr,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ws_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}
