//! # RTT Latency Filters
//!
//! Raw round-trip samples are noisy: queueing delay, scheduler jitter, and
//! the occasional retransmit all land on top of the propagation latency the
//! coordinate system actually wants to embed. A filter converts raw samples
//! into the distance estimate fed to the spring update.
//!
//! Three implementations are selectable by configuration:
//!
//! - **Raw** — identity; every sample passes through untouched.
//! - **EWMA** — one global exponentially weighted moving average with a
//!   fixed α of 0.15; the peer id is ignored.
//! - **Moving percentile** — a per-peer sliding window of size *h*; once the
//!   window is full, each call returns the *p*-th percentile of the window.
//!
//! All variants are thread-safe: the Vivaldi and gossip client loops share
//! one filter so the moving-percentile windows see both loops' samples.

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

/// Fixed smoothing factor for the EWMA filter.
const EWMA_ALPHA: f64 = 0.15;

/// An RTT filter. All timings are in milliseconds.
#[derive(Debug)]
pub enum RttFilter {
    /// Identity filter.
    Raw,
    /// Single global exponentially weighted moving average.
    Ewma {
        /// Current smoothed value in milliseconds.
        state: Mutex<f64>,
    },
    /// Per-peer sliding-window percentile.
    MovingPercentile {
        /// Window size per peer.
        h: usize,
        /// Percentile in [0, 100].
        p: f64,
        /// Sliding windows keyed by peer id.
        windows: DashMap<Uuid, Vec<f64>>,
    },
}

impl RttFilter {
    /// The identity filter.
    pub fn raw() -> Self {
        Self::Raw
    }

    /// A global EWMA filter with α = 0.15.
    pub fn ewma() -> Self {
        Self::Ewma {
            state: Mutex::new(0.0),
        }
    }

    /// A per-peer moving-percentile filter with window size `h` and
    /// percentile `p` in [0, 100].
    pub fn moving_percentile(h: usize, p: f64) -> Self {
        assert!(h > 0, "moving-percentile window size must be positive");
        assert!((0.0..=100.0).contains(&p), "percentile must be in [0, 100]");
        Self::MovingPercentile {
            h,
            p,
            windows: DashMap::new(),
        }
    }

    /// Filters one raw RTT sample for `peer`, returning the smoothed value.
    pub fn filter(&self, peer: Uuid, rtt_ms: f64) -> f64 {
        match self {
            Self::Raw => rtt_ms,
            Self::Ewma { state } => {
                let mut current = state.lock();
                *current = EWMA_ALPHA * rtt_ms + (1.0 - EWMA_ALPHA) * *current;
                *current
            }
            Self::MovingPercentile { h, p, windows } => {
                let mut window = windows.entry(peer).or_default();
                if window.len() < *h {
                    // Warm-up: pass the raw sample through until the window fills.
                    window.push(rtt_ms);
                    return rtt_ms;
                }
                window.remove(0);
                window.push(rtt_ms);

                let mut samples = window.clone();
                samples.sort_by(f64::total_cmp);
                let index = (samples.len() as f64 * (p / 100.0)) as usize;
                samples[index.min(samples.len() - 1)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_is_identity() {
        let filter = RttFilter::raw();
        assert_eq!(filter.filter(Uuid::new_v4(), 17.5), 17.5);
    }

    #[test]
    fn ewma_blends_toward_new_samples() {
        let filter = RttFilter::ewma();
        let peer = Uuid::new_v4();

        let first = filter.filter(peer, 100.0);
        assert!((first - 15.0).abs() < 1e-12, "0.15 * 100 from a zero start");

        let second = filter.filter(peer, 100.0);
        assert!((second - (0.15 * 100.0 + 0.85 * 15.0)).abs() < 1e-12);
    }

    #[test]
    fn ewma_state_is_global_across_peers() {
        let filter = RttFilter::ewma();
        filter.filter(Uuid::new_v4(), 100.0);
        let from_other_peer = filter.filter(Uuid::new_v4(), 100.0);
        assert!((from_other_peer - (0.15 * 100.0 + 0.85 * 15.0)).abs() < 1e-12);
    }

    #[test]
    fn moving_percentile_warms_up_raw_then_slides() {
        let filter = RttFilter::moving_percentile(4, 25.0);
        let peer = Uuid::new_v4();

        // Until the window is full, samples pass through raw.
        for raw in [10.0, 40.0, 30.0, 20.0] {
            assert_eq!(filter.filter(peer, raw), raw);
        }

        // Fifth sample: window becomes [40, 30, 20, 50]; sorted
        // [20, 30, 40, 50]; index floor(4 * 0.25) = 1 selects 30.
        assert_eq!(filter.filter(peer, 50.0), 30.0);
    }

    #[test]
    fn moving_percentile_windows_are_per_peer() {
        let filter = RttFilter::moving_percentile(2, 50.0);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        filter.filter(a, 10.0);
        filter.filter(a, 20.0);
        // Peer b's window is still warming up even though a's is full.
        assert_eq!(filter.filter(b, 99.0), 99.0);
        // a's window slides: [20, 30] sorted, index 1 -> 30.
        assert_eq!(filter.filter(a, 30.0), 30.0);
    }
}
