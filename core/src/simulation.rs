//! Shared simulation state.
//!
//! All mutations of nodes, links, ledger and selection go through one
//! `RwLock`, so block numbers stay monotonic even with concurrent callers.

use crate::ledger::{Block, Ledger};
use crate::network::{NetworkConnection, NetworkNode, Position, Topology};
use crate::snapshot::Snapshot;
use crate::transfer::TransferPhase;
use crate::{Result, SimError};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock, RwLockReadGuard};
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 256;

/// Transient UI focus. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub node: Option<String>,
    pub connection: Option<String>,
    /// Node picked as the default transfer source.
    pub source_node: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulationState {
    pub topology: Topology,
    pub ledger: Ledger,
    pub selection: Selection,
    pub phase: TransferPhase,
}

impl SimulationState {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            ..Default::default()
        }
    }

    pub fn remove_node(&mut self, id: &str) -> Result<Vec<NetworkConnection>> {
        let removed = self.topology.remove_node(id)?;
        if self.selection.node.as_deref() == Some(id) {
            self.selection.node = None;
        }
        if self.selection.source_node.as_deref() == Some(id) {
            self.selection.source_node = None;
        }
        if let Some(selected) = self.selection.connection.as_deref() {
            if removed.iter().any(|c| c.id == selected) {
                self.selection.connection = None;
            }
        }
        Ok(removed)
    }

    pub fn remove_connection(&mut self, id: &str) -> Result<NetworkConnection> {
        let removed = self.topology.remove_connection(id)?;
        if self.selection.connection.as_deref() == Some(id) {
            self.selection.connection = None;
        }
        Ok(removed)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.topology, &self.ledger)
    }

    /// Replace topology and ledger wholesale and clear selection.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.topology = snapshot.topology();
        self.ledger = snapshot.blockchain;
        self.selection = Selection::default();
    }
}

/// Progress notifications for observers such as a UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SimEvent {
    TopologyChanged,
    LedgerReset {
        blocks: usize,
    },
    TransferStarted {
        file_name: String,
        chunks: usize,
        source: String,
        destination: String,
    },
    RoutePlanned {
        path: Vec<String>,
    },
    HopStarted {
        chunk_id: u32,
        from: String,
        to: String,
    },
    HopSkipped {
        chunk_id: u32,
        from: String,
        to: String,
    },
    BlockAppended {
        block: Block,
    },
    TransferCompleted {
        file_name: String,
        blocks: usize,
    },
    TransferFailed {
        reason: String,
    },
}

/// Cloneable handle to one simulation.
#[derive(Clone)]
pub struct Simulation {
    pub(crate) state: Arc<RwLock<SimulationState>>,
    events: broadcast::Sender<SimEvent>,
    pub(crate) cancel: Arc<AtomicBool>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(Topology::default())
    }
}

impl Simulation {
    pub fn new(topology: Topology) -> Self {
        Self::with_state(SimulationState::new(topology))
    }

    fn with_state(state: SimulationState) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(state)),
            events,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn demo() -> Self {
        Self::new(Topology::demo())
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = SimulationState::default();
        state.restore(snapshot);
        Self::with_state(state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SimEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Read-only view of the whole state.
    pub async fn read(&self) -> RwLockReadGuard<'_, SimulationState> {
        self.state.read().await
    }

    pub async fn nodes(&self) -> Vec<NetworkNode> {
        self.state.read().await.topology.nodes.clone()
    }

    pub async fn connections(&self) -> Vec<NetworkConnection> {
        self.state.read().await.topology.connections.clone()
    }

    pub async fn ledger(&self) -> Ledger {
        self.state.read().await.ledger.clone()
    }

    pub async fn selection(&self) -> Selection {
        self.state.read().await.selection.clone()
    }

    pub async fn phase(&self) -> TransferPhase {
        self.state.read().await.phase
    }

    pub async fn add_node(&self, node: NetworkNode) -> Result<()> {
        let label = node.label.clone();
        self.state.write().await.topology.add_node(node)?;
        info!("➕ Node \"{}\" added", label);
        self.emit(SimEvent::TopologyChanged);
        Ok(())
    }

    /// Remove a node together with every link that references it.
    pub async fn remove_node(&self, id: &str) -> Result<Vec<NetworkConnection>> {
        let removed = self.state.write().await.remove_node(id)?;
        info!("➖ Node {} removed with {} connection(s)", id, removed.len());
        self.emit(SimEvent::TopologyChanged);
        Ok(removed)
    }

    pub async fn move_node(&self, id: &str, position: Position) -> Result<()> {
        self.state.write().await.topology.set_position(id, position)
    }

    pub async fn add_connection(&self, connection: NetworkConnection) -> Result<()> {
        debug!(
            "Connecting {} <-> {} via {}",
            connection.source, connection.target, connection.id
        );
        self.state.write().await.topology.add_connection(connection)?;
        self.emit(SimEvent::TopologyChanged);
        Ok(())
    }

    pub async fn update_connection(&self, connection: NetworkConnection) -> Result<()> {
        self.state
            .write()
            .await
            .topology
            .update_connection(connection)?;
        self.emit(SimEvent::TopologyChanged);
        Ok(())
    }

    pub async fn remove_connection(&self, id: &str) -> Result<NetworkConnection> {
        let removed = self.state.write().await.remove_connection(id)?;
        self.emit(SimEvent::TopologyChanged);
        Ok(removed)
    }

    pub async fn select_node(&self, id: Option<String>) {
        self.state.write().await.selection.node = id;
    }

    pub async fn select_connection(&self, id: Option<String>) {
        self.state.write().await.selection.connection = id;
    }

    pub async fn select_source(&self, id: Option<String>) {
        self.state.write().await.selection.source_node = id;
    }

    pub async fn save_snapshot(&self) -> Snapshot {
        self.state.read().await.snapshot()
    }

    /// Replace nodes, links and ledger. Refused while a transfer is running
    /// so block numbering cannot interleave.
    pub async fn load_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let blocks = {
            let mut state = self.state.write().await;
            if state.phase.is_active() {
                return Err(SimError::TransferInProgress);
            }
            state.restore(snapshot);
            state.ledger.len()
        };
        info!("📂 Simulation loaded ({} blocks)", blocks);
        self.emit(SimEvent::TopologyChanged);
        self.emit(SimEvent::LedgerReset { blocks });
        Ok(())
    }

    /// Parse and load a snapshot. Any error leaves the current state untouched.
    pub async fn load_snapshot_json(&self, json: &str) -> Result<()> {
        let snapshot = Snapshot::from_json(json)?;
        self.load_snapshot(snapshot).await
    }

    /// Ask the running transfer to stop at its next hop boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}
