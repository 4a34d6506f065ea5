//! Simulated per-hop transfer time.
//!
//! A hop costs its serialization time plus the link latency. Packet loss is
//! modelled as a single draw: with probability `packet_loss` the hop suffers
//! 1–3 retries and the whole cost is multiplied by `1 + retries`.

use crate::{Result, SimError};
use rand::Rng;

const MAX_RETRIES: f64 = 3.0;

/// Transfer time in milliseconds without any retry penalty.
pub fn base_transfer_time(chunk_size: u64, bandwidth_mbps: f64, latency_ms: f64) -> f64 {
    let megabits = (chunk_size as f64 * 8.0) / (1024.0 * 1024.0);
    megabits / bandwidth_mbps * 1000.0 + latency_ms
}

/// Draw one simulated transfer time in milliseconds.
///
/// Identical inputs may return different values; pass a seeded RNG for
/// reproducible results.
pub fn estimate_transfer_time<R: Rng + ?Sized>(
    rng: &mut R,
    chunk_size: u64,
    bandwidth_mbps: f64,
    latency_ms: f64,
    packet_loss: f64,
) -> Result<f64> {
    check_link_params(bandwidth_mbps, latency_ms, packet_loss).map_err(|reason| {
        SimError::InvalidLink {
            id: "<estimate>".to_string(),
            reason,
        }
    })?;

    let base = base_transfer_time(chunk_size, bandwidth_mbps, latency_ms);
    if packet_loss > 0.0 && rng.gen::<f64>() < packet_loss {
        // U on (0, 1] so the ceiling is never zero
        let u = 1.0 - rng.gen::<f64>();
        let retries = (u * MAX_RETRIES).ceil();
        return Ok(base * (1.0 + retries));
    }

    Ok(base)
}

pub(crate) fn check_link_params(
    bandwidth_mbps: f64,
    latency_ms: f64,
    packet_loss: f64,
) -> std::result::Result<(), String> {
    if !(bandwidth_mbps > 0.0 && bandwidth_mbps.is_finite()) {
        return Err(format!("bandwidth must be positive, got {}", bandwidth_mbps));
    }
    if !(latency_ms >= 0.0 && latency_ms.is_finite()) {
        return Err(format!("latency must be non-negative, got {}", latency_ms));
    }
    if !(0.0..=1.0).contains(&packet_loss) {
        return Err(format!("packet loss must be within [0, 1], got {}", packet_loss));
    }
    Ok(())
}
