//! Chunked multi-hop transfer driver.
//!
//! A transfer moves through `Chunking -> RoutePlanning -> Transferring` and
//! ends in `Completed` or `Failed`. The route is computed once from a copy of
//! the topology taken at planning time. Chunks are sent strictly one after
//! another, each walking every hop of the route before the next one starts,
//! and every hop that finds a link appends exactly one block.

use crate::estimate::estimate_transfer_time;
use crate::file::{FileChunk, SimFile, DEFAULT_CHUNK_SIZE};
use crate::network::{NodeStatus, Topology};
use crate::route::shortest_path;
use crate::simulation::{SimEvent, Simulation};
use crate::{Result, SimError, ValidationError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPhase {
    #[default]
    Idle,
    Chunking,
    RoutePlanning,
    Transferring,
    Completed,
    Failed,
}

impl TransferPhase {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Chunking | Self::RoutePlanning | Self::Transferring
        )
    }
}

/// How long each hop holds the transfer loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Yield to other tasks but do not wait.
    Instant,
    /// Sleep for the simulated transfer time.
    RealTime,
    /// Sleep for the simulated time multiplied by a factor.
    Scaled(f64),
}

impl Pacing {
    async fn pause(&self, transfer_time_ms: f64) {
        let millis = match self {
            Self::Instant => {
                tokio::task::yield_now().await;
                return;
            }
            Self::RealTime => transfer_time_ms,
            Self::Scaled(factor) => transfer_time_ms * factor,
        };
        let delay = Duration::try_from_secs_f64(millis.max(0.0) / 1000.0).unwrap_or(Duration::ZERO);
        tokio::time::sleep(delay).await;
    }
}

impl FromStr for Pacing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "instant" => Ok(Self::Instant),
            "realtime" => Ok(Self::RealTime),
            other => match other.parse::<f64>() {
                Ok(factor) if factor >= 0.0 && factor.is_finite() => Ok(Self::Scaled(factor)),
                _ => Err(format!(
                    "invalid pacing '{}': expected instant, realtime or a non-negative factor",
                    other
                )),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub pacing: Pacing,
    /// Seed for the packet-loss draws. `None` uses OS entropy.
    pub seed: Option<u64>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            pacing: Pacing::RealTime,
            seed: None,
        }
    }
}

impl TransferOptions {
    pub fn instant() -> Self {
        Self {
            pacing: Pacing::Instant,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// What the user picked in the transfer form.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub file: Option<SimFile>,
    pub source: Option<String>,
    pub destination: Option<String>,
    /// Bytes.
    pub chunk_size: usize,
}

impl TransferRequest {
    pub fn new(file: SimFile, source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            file: Some(file),
            source: Some(source.into()),
            destination: Some(destination.into()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> std::result::Result<(&SimFile, &str, &str), ValidationError> {
        let file = self.file.as_ref().ok_or(ValidationError::NoFile)?;
        let source = self.source.as_deref().ok_or(ValidationError::NoSource)?;
        let destination = self
            .destination
            .as_deref()
            .ok_or(ValidationError::NoDestination)?;
        if source == destination {
            return Err(ValidationError::SameEndpoints(source.to_string()));
        }
        if self.chunk_size == 0 {
            return Err(ValidationError::ZeroChunkSize);
        }
        Ok((file, source, destination))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReport {
    pub file_name: String,
    pub path: Vec<String>,
    pub chunks: usize,
    pub blocks_appended: usize,
    pub skipped_hops: usize,
    /// Sum of simulated hop times, in milliseconds.
    pub total_time_ms: f64,
}

impl Simulation {
    /// Run one transfer to completion.
    ///
    /// Invalid requests are rejected without touching any state. Once a
    /// transfer has started, any failure leaves it `Failed` and keeps every
    /// block already appended.
    pub async fn start_transfer(
        &self,
        request: TransferRequest,
        options: TransferOptions,
    ) -> Result<TransferReport> {
        let (file, source, destination) = request.validate()?;

        {
            let mut state = self.state.write().await;
            if state.phase.is_active() {
                return Err(SimError::TransferInProgress);
            }
            state.phase = TransferPhase::Chunking;
            self.cancel.store(false, Ordering::SeqCst);
        }

        info!(
            "🚀 Starting transfer of {} ({} bytes) from {} to {}",
            file.name,
            file.size(),
            source,
            destination
        );

        let result = self
            .run_transfer(file, source, destination, request.chunk_size, &options)
            .await;

        let phase = match &result {
            Ok(_) => TransferPhase::Completed,
            Err(_) => TransferPhase::Failed,
        };
        self.state.write().await.phase = phase;

        match &result {
            Ok(report) => {
                info!(
                    "✅ Transfer of {} complete: {} blocks over {} hops",
                    report.file_name,
                    report.blocks_appended,
                    report.path.len() - 1
                );
                self.emit(SimEvent::TransferCompleted {
                    file_name: report.file_name.clone(),
                    blocks: report.blocks_appended,
                });
            }
            Err(e) => {
                error!("❌ Transfer of {} failed: {}", file.name, e);
                self.emit(SimEvent::TransferFailed {
                    reason: e.to_string(),
                });
            }
        }

        result
    }

    async fn run_transfer(
        &self,
        file: &SimFile,
        source: &str,
        destination: &str,
        chunk_size: usize,
        options: &TransferOptions,
    ) -> Result<TransferReport> {
        let chunks = file.chunks(chunk_size)?;
        debug!("Split {} into {} chunks", file.name, chunks.len());
        self.emit(SimEvent::TransferStarted {
            file_name: file.name.clone(),
            chunks: chunks.len(),
            source: source.to_string(),
            destination: destination.to_string(),
        });

        let topology = {
            let mut state = self.state.write().await;
            state.phase = TransferPhase::RoutePlanning;
            state.topology.clone()
        };

        let path = shortest_path(&topology.nodes, &topology.connections, source, destination);
        if path.len() < 2 {
            return Err(SimError::NoRoute {
                from: source.to_string(),
                to: destination.to_string(),
            });
        }
        info!("🧭 Route: {}", path.join(" -> "));
        self.emit(SimEvent::RoutePlanned { path: path.clone() });

        self.state.write().await.phase = TransferPhase::Transferring;

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.walk_path(&topology, &path, &chunks, &file.name, options.pacing, &mut rng)
            .await
    }

    /// Send every chunk along `path`, hop by hop.
    ///
    /// A hop whose endpoints share no link in `topology` is skipped without
    /// appending a block.
    async fn walk_path(
        &self,
        topology: &Topology,
        path: &[String],
        chunks: &[FileChunk],
        file_name: &str,
        pacing: Pacing,
        rng: &mut StdRng,
    ) -> Result<TransferReport> {
        let mut report = TransferReport {
            file_name: file_name.to_string(),
            path: path.to_vec(),
            chunks: chunks.len(),
            blocks_appended: 0,
            skipped_hops: 0,
            total_time_ms: 0.0,
        };

        for chunk in chunks {
            let hash = chunk.hash.to_hex();

            for hop in path.windows(2) {
                let (from, to) = (hop[0].as_str(), hop[1].as_str());

                self.mark_endpoints(from, to, NodeStatus::Transferring).await;
                self.emit(SimEvent::HopStarted {
                    chunk_id: chunk.id,
                    from: from.to_string(),
                    to: to.to_string(),
                });

                let Some(link) = topology.connection_between(from, to) else {
                    warn!("No link between {} and {}, skipping hop", from, to);
                    self.mark_endpoints(from, to, NodeStatus::Online).await;
                    report.skipped_hops += 1;
                    self.emit(SimEvent::HopSkipped {
                        chunk_id: chunk.id,
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                    continue;
                };

                let transfer_time = match estimate_transfer_time(
                    rng,
                    chunk.size(),
                    link.bandwidth,
                    link.latency,
                    link.packet_loss,
                ) {
                    Ok(t) => t,
                    Err(e) => {
                        self.mark_endpoints(from, to, NodeStatus::Online).await;
                        return Err(match e {
                            SimError::InvalidLink { reason, .. } => SimError::InvalidLink {
                                id: link.id.clone(),
                                reason,
                            },
                            other => other,
                        });
                    }
                };

                pacing.pause(transfer_time).await;

                if self.cancel.load(Ordering::SeqCst) {
                    self.mark_endpoints(from, to, NodeStatus::Online).await;
                    return Err(SimError::Cancelled);
                }

                let block = {
                    let mut state = self.state.write().await;
                    let block = state
                        .ledger
                        .record(
                            chunk.id,
                            file_name,
                            &hash,
                            topology.label_of(from),
                            topology.label_of(to),
                            transfer_time,
                        )
                        .clone();
                    set_endpoint_status(&mut state.topology, from, to, NodeStatus::Online);
                    block
                };

                debug!(
                    "📦 Block #{}: chunk {} {} -> {} in {:.1}ms via {}",
                    block.block_number, chunk.id, block.from, block.to, transfer_time, link.id
                );
                report.blocks_appended += 1;
                report.total_time_ms += transfer_time;
                self.emit(SimEvent::BlockAppended { block });
            }
        }

        Ok(report)
    }

    async fn mark_endpoints(&self, from: &str, to: &str, status: NodeStatus) {
        let mut state = self.state.write().await;
        set_endpoint_status(&mut state.topology, from, to, status);
    }
}

/// Nodes removed mid-transfer are ignored.
fn set_endpoint_status(topology: &mut Topology, from: &str, to: &str, status: NodeStatus) {
    for id in [from, to] {
        if topology.set_status(id, status).is_err() {
            debug!("Node {} no longer exists, status not updated", id);
        }
    }
}
