//! Save/load bundle for topology and ledger state.

use crate::ledger::{Block, Ledger};
use crate::network::{NetworkConnection, NetworkNode, Topology};
use crate::{Result, SimError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SNAPSHOT_VERSION: u32 = 1;

pub const DEFAULT_SNAPSHOT_FILE: &str = "ipfs-simulation.simnet.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub nodes: Vec<NetworkNode>,
    pub connections: Vec<NetworkConnection>,
    pub blockchain: Ledger,
}

/// Wire shape accepted on load: `nodes` and `connections` are required,
/// everything else falls back to a default.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    version: Option<u32>,
    created_at: Option<DateTime<Utc>>,
    nodes: Option<Vec<NetworkNode>>,
    connections: Option<Vec<NetworkConnection>>,
    blockchain: Option<Vec<Block>>,
}

impl Snapshot {
    pub fn capture(topology: &Topology, ledger: &Ledger) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            nodes: topology.nodes.clone(),
            connections: topology.connections.clone(),
            blockchain: ledger.clone(),
        }
    }

    pub fn topology(&self) -> Topology {
        Topology {
            nodes: self.nodes.clone(),
            connections: self.connections.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_str(json)?;

        let nodes = raw
            .nodes
            .ok_or_else(|| SimError::InvalidSnapshot("missing nodes".to_string()))?;
        let connections = raw
            .connections
            .ok_or_else(|| SimError::InvalidSnapshot("missing connections".to_string()))?;
        let topology = checked_topology(nodes, connections)?;

        let blocks = raw.blockchain.unwrap_or_default();
        if let Some((i, block)) = blocks
            .iter()
            .enumerate()
            .find(|(i, b)| b.block_number != *i as u64)
        {
            return Err(SimError::InvalidSnapshot(format!(
                "block {} at position {} is out of sequence",
                block.block_number, i
            )));
        }

        let mut blockchain = Ledger::new();
        blockchain.reset(blocks);

        Ok(Self {
            version: raw.version.unwrap_or(SNAPSHOT_VERSION),
            created_at: raw.created_at.unwrap_or_else(Utc::now),
            nodes: topology.nodes,
            connections: topology.connections,
            blockchain,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Replay the loaded nodes and links through the same checks as live edits:
/// unique ids, valid link parameters, endpoints that name a loaded node.
fn checked_topology(
    nodes: Vec<NetworkNode>,
    connections: Vec<NetworkConnection>,
) -> Result<Topology> {
    let mut topology = Topology::new();
    for node in nodes {
        topology.add_node(node).map_err(invalid)?;
    }
    for connection in connections {
        topology.add_connection(connection).map_err(invalid)?;
    }
    Ok(topology)
}

fn invalid(err: SimError) -> SimError {
    SimError::InvalidSnapshot(err.to_string())
}
