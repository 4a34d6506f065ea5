pub mod estimate;
pub mod file;
pub mod hash;
pub mod ledger;
pub mod message;
pub mod network;
pub mod route;
pub mod simulation;
pub mod snapshot;
pub mod transfer;

pub use estimate::{base_transfer_time, estimate_transfer_time};
pub use file::{chunk_bytes, FileChunk, SimFile};
pub use hash::{content_hash, ContentHash};
pub use ledger::{Block, Ledger, LedgerError};
pub use message::{ClientMessage, Listener, ServerMessage, SignalKind};
pub use network::{LinkType, NetworkConnection, NetworkNode, NodeStatus, Position, Topology};
pub use route::shortest_path;
pub use simulation::{Selection, SimEvent, Simulation, SimulationState};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};
pub use transfer::{Pacing, TransferOptions, TransferPhase, TransferReport, TransferRequest};

/// Reasons a transfer request is rejected before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no file selected")]
    NoFile,

    #[error("source node not selected")]
    NoSource,

    #[error("destination node not selected")]
    NoDestination,

    #[error("source and destination must differ (both {0})")]
    SameEndpoints(String),

    #[error("chunk size must be positive")]
    ZeroChunkSize,
}

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Invalid transfer request: {0}")]
    Validation(#[from] ValidationError),

    #[error("No path found between {from} and {to}")]
    NoRoute { from: String, to: String },

    #[error("A transfer is already in progress")]
    TransferInProgress,

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Invalid link {id}: {reason}")]
    InvalidLink { id: String, reason: String },

    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Connection already exists: {0}")]
    DuplicateConnection(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
