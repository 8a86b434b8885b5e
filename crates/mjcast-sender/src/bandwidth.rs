//! On-wire bitrate estimate for transmitted frames. Observability only.

use std::time::{Duration, Instant};

use mjcast_transport::{FRAGMENT_HEADER, IP_UDP_OVERHEAD};

/// EWMA time constant.
pub const EWMA_TAU: Duration = Duration::from_secs(5);

/// Bits a frame occupies on the wire, counting fragment headers, IP/UDP
/// overhead per datagram, and every repeat.
pub fn bits_on_wire(payload_len: usize, fragments: usize, repeats: usize) -> u64 {
    let bytes = payload_len + fragments * (FRAGMENT_HEADER + IP_UDP_OVERHEAD);
    (bytes * repeats) as u64 * 8
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    /// Bits of this frame over the time since the previous send; 0 for the first.
    pub inst_bps: f64,
    pub ewma_bps: f64,
}

pub struct BandwidthEstimator {
    tau: f64,
    last_send: Option<Instant>,
    ewma_bps: Option<f64>,
}

impl BandwidthEstimator {
    pub fn new(tau: Duration) -> Self {
        Self {
            tau: tau.as_secs_f64(),
            last_send: None,
            ewma_bps: None,
        }
    }

    /// Record a send of `bits` at `now`.
    ///
    /// The first measurable rate seeds the average; later ones blend in with
    /// `alpha = 1 - e^(-dt/tau)`, dt being the real gap between sends.
    pub fn record(&mut self, bits: u64, now: Instant) -> RateSample {
        let dt = self
            .last_send
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .filter(|dt| *dt > 0.0);
        self.last_send = Some(now);

        let Some(dt) = dt else {
            return RateSample { inst_bps: 0.0, ewma_bps: self.ewma_bps.unwrap_or(0.0) };
        };

        let inst_bps = bits as f64 / dt;
        let ewma_bps = match self.ewma_bps {
            None => inst_bps,
            Some(prev) => {
                let alpha = 1.0 - (-dt / self.tau).exp();
                alpha * inst_bps + (1.0 - alpha) * prev
            }
        };
        self.ewma_bps = Some(ewma_bps);
        RateSample { inst_bps, ewma_bps }
    }
}

impl Default for BandwidthEstimator {
    fn default() -> Self {
        Self::new(EWMA_TAU)
    }
}
