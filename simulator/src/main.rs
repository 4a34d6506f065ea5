//! Command-line driver for the network simulator.

use anyhow::Context;
use clap::{Parser, Subcommand};
use simnet_core::snapshot::DEFAULT_SNAPSHOT_FILE;
use simnet_core::{
    Ledger, Pacing, SimError, SimEvent, SimFile, Simulation, Snapshot, Topology,
    TransferOptions, TransferRequest,
};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "simnet-simulator",
    version,
    about = "Simulate chunked file transfers over a peer network"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the three-node demo network to a snapshot file.
    Demo {
        #[arg(long, default_value = DEFAULT_SNAPSHOT_FILE)]
        out: PathBuf,
    },

    /// Send one file across the network and record every hop.
    Transfer {
        /// File to send.
        #[arg(long)]
        file: PathBuf,

        /// Source node id or label.
        #[arg(long)]
        from: String,

        /// Destination node id or label.
        #[arg(long)]
        to: String,

        /// Start from this snapshot instead of the demo network.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        #[arg(long, default_value_t = 256)]
        chunk_size_kb: usize,

        /// instant, realtime, or a factor applied to each hop delay.
        #[arg(long, default_value = "instant")]
        pace: Pacing,

        /// Seed for packet-loss draws.
        #[arg(long)]
        seed: Option<u64>,

        /// Write the resulting state to this snapshot file.
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Print a snapshot's network and ledger.
    Inspect {
        #[arg(long, default_value = DEFAULT_SNAPSHOT_FILE)]
        snapshot: PathBuf,

        /// Show what this node (id or label) sent and received.
        #[arg(long)]
        node: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Demo { out } => write_demo(&out),
        Command::Transfer {
            file,
            from,
            to,
            snapshot,
            chunk_size_kb,
            pace,
            seed,
            save,
        } => {
            let options = TransferOptions {
                pacing: pace,
                seed,
            };
            let sim = run_transfer(
                &file,
                &from,
                &to,
                snapshot.as_deref(),
                chunk_size_bytes(chunk_size_kb)?,
                options,
            )
            .await?;

            print_ledger(&sim.ledger().await);
            if let Some(path) = save {
                sim.save_snapshot()
                    .await
                    .save(&path)
                    .with_context(|| format!("writing snapshot {}", path.display()))?;
                info!("💾 Saved simulation to {}", path.display());
            }
            Ok(())
        }
        Command::Inspect { snapshot, node } => inspect(&snapshot, node.as_deref()),
    }
}

fn write_demo(out: &Path) -> anyhow::Result<()> {
    Snapshot::capture(&Topology::demo(), &Ledger::new())
        .save(out)
        .with_context(|| format!("writing snapshot {}", out.display()))?;
    info!("💾 Demo network written to {}", out.display());
    Ok(())
}

async fn run_transfer(
    file: &Path,
    from: &str,
    to: &str,
    snapshot: Option<&Path>,
    chunk_size: usize,
    options: TransferOptions,
) -> anyhow::Result<Simulation> {
    let sim = match snapshot {
        Some(path) => Simulation::from_snapshot(
            Snapshot::load(path).with_context(|| format!("loading {}", path.display()))?,
        ),
        None => Simulation::demo(),
    };
    let file =
        SimFile::from_path(file).with_context(|| format!("reading {}", file.display()))?;

    let (source, destination) = {
        let state = sim.read().await;
        (
            resolve_node(&state.topology, from)?,
            resolve_node(&state.topology, to)?,
        )
    };

    let logger = tokio::spawn(log_events(sim.subscribe()));

    let request = TransferRequest::new(file, source, destination).with_chunk_size(chunk_size);
    let result = sim.start_transfer(request, options).await;
    match &result {
        // Rejected before anything was emitted.
        Err(SimError::Validation(_)) | Err(SimError::TransferInProgress) => logger.abort(),
        _ => {
            let _ = logger.await;
        }
    }

    let report = result?;
    info!(
        "📊 {} chunk(s), {} block(s), {} skipped hop(s), {:.1}ms simulated",
        report.chunks, report.blocks_appended, report.skipped_hops, report.total_time_ms
    );
    Ok(sim)
}

fn chunk_size_bytes(kb: usize) -> anyhow::Result<usize> {
    kb.checked_mul(1024)
        .with_context(|| format!("chunk size of {} KiB is too large", kb))
}

/// Accept either a node id or its label.
fn resolve_node(topology: &Topology, key: &str) -> anyhow::Result<String> {
    topology
        .nodes
        .iter()
        .find(|n| n.id == key)
        .or_else(|| topology.nodes.iter().find(|n| n.label == key))
        .map(|n| n.id.clone())
        .with_context(|| format!("no node with id or label '{}'", key))
}

/// Log progress until the transfer finishes one way or the other.
async fn log_events(mut events: broadcast::Receiver<SimEvent>) {
    loop {
        match events.recv().await {
            Ok(SimEvent::RoutePlanned { path }) => debug!("Route planned: {:?}", path),
            Ok(SimEvent::HopStarted { chunk_id, from, to }) => {
                debug!("Chunk {} leaving {} for {}", chunk_id, from, to)
            }
            Ok(SimEvent::HopSkipped { chunk_id, from, to }) => {
                warn!("Chunk {} skipped hop {} -> {}", chunk_id, from, to)
            }
            Ok(SimEvent::BlockAppended { block }) => info!(
                "📦 #{} chunk {} {} -> {} ({:.2}ms)",
                block.block_number, block.chunk_id, block.from, block.to, block.transfer_time
            ),
            Ok(SimEvent::TransferCompleted { .. }) | Ok(SimEvent::TransferFailed { .. }) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event log lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn inspect(path: &Path, node: Option<&str>) -> anyhow::Result<()> {
    let snapshot =
        Snapshot::load(path).with_context(|| format!("loading {}", path.display()))?;
    let topology = snapshot.topology();

    println!("Nodes ({}):", topology.nodes.len());
    for n in &topology.nodes {
        println!("  {:<12} {:<12} {:?}", n.id, n.label, n.status);
    }
    println!("Connections ({}):", topology.connections.len());
    for c in &topology.connections {
        println!(
            "  {:<12} {} <-> {}  {:?} {}ms {}Mbps loss {:.0}%",
            c.id,
            topology.label_of(&c.source),
            topology.label_of(&c.target),
            c.link_type,
            c.latency,
            c.bandwidth,
            c.packet_loss * 100.0
        );
    }
    print_ledger(&snapshot.blockchain);

    if let Some(key) = node {
        let id = resolve_node(&topology, key)?;
        print_node_view(&snapshot.blockchain, topology.label_of(&id));
    }
    Ok(())
}

fn print_ledger(ledger: &Ledger) {
    println!("Ledger ({} blocks):", ledger.len());
    for b in ledger.blocks() {
        println!(
            "  #{:<4} {:<20} chunk {:<4} {} -> {}  {:.2}ms  {}",
            b.block_number,
            b.file_name,
            b.chunk_id,
            b.from,
            b.to,
            b.transfer_time,
            short_hash(&b.hash)
        );
    }
}

fn print_node_view(ledger: &Ledger, label: &str) {
    println!("{}:", label);
    println!("  sent:     {}", ledger.files_sent_by(label).join(", "));
    println!("  received: {}", ledger.files_received_by(label).join(", "));
    println!(
        "  chunks:   {}",
        ledger
            .chunks_touching(label)
            .iter()
            .map(|(file, id)| format!("{}#{}", file, id))
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
