//! # Periodic Client Loops
//!
//! The active half of each service. Every node runs three long-lived
//! tasks, each pairing with one of the servers in [`crate::servers`]:
//!
//! - **membership** — every `uniform(0, 4·sampling_interval)` seconds, age
//!   the view, shuffle with one random peer, merge the reply.
//! - **vivaldi** — every `sampling_interval` seconds, pull one random
//!   peer's system coordinate, measure the RTT, filter it, run one spring
//!   step, and let the stabilizer judge the new position.
//! - **gossip** — every `sampling_interval` seconds, exchange the infected
//!   selection with one random peer and apply the echoes; the measured RTT
//!   feeds the shared filter as an extra sample.
//!
//! Failure handling is uniform: any peer RPC error logs, evicts the peer
//! from the view (and, for gossip, purges its epidemic state), and the
//! loop moves on. The loops themselves are the retry mechanism — there are
//! no retries at the RPC layer.
//!
//! Locks are never held across an RPC: each iteration snapshots what it
//! needs, calls out, and reacquires to apply results.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use atlas_protocol::coord::{RttFilter, SpaceContext};
use atlas_protocol::gossip::GossipEngine;
use atlas_protocol::membership::Descriptor;
use atlas_protocol::stabilizer::Stabilizer;
use atlas_protocol::wire::{NodeRecord, ShuffleRequest};

use crate::metrics::SharedMetrics;
use crate::results::ResultWriter;
use crate::servers::{SharedView, SharedVivaldi};

// ---------------------------------------------------------------------------
// Membership loop
// ---------------------------------------------------------------------------

/// The Cyclon shuffle client.
pub struct MembershipLoop {
    /// The shared partial view.
    pub view: SharedView,
    /// Base sampling interval in seconds.
    pub interval_secs: u64,
    /// Node metrics.
    pub metrics: SharedMetrics,
}

impl MembershipLoop {
    /// Runs forever. One iteration per randomized interval.
    pub async fn run(self) {
        loop {
            // Desynchronize shuffles across the fleet: a uniform draw from
            // [0, 4·interval) rather than a fixed cadence.
            let wait = rand::thread_rng().gen_range(0.0..4.0 * self.interval_secs as f64);
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
            self.round().await;
        }
    }

    async fn round(&self) {
        self.metrics.shuffle_rounds_total.inc();

        let (descriptor, request) = {
            let mut view = self.view.write().await;
            view.bump_ages();
            let Some(descriptor) = view.random_descriptor() else {
                debug!("membership round skipped: view is empty");
                return;
            };
            let request = ShuffleRequest {
                nodes: view.sending_nodes(),
                source: view.local_node().clone(),
            };
            (descriptor, request)
        };

        match descriptor.channels().shuffle_peers(&request).await {
            Err(error) => {
                warn!(peer = %descriptor.remote().id, %error, "shuffle failed; evicting peer");
                self.metrics.peers_evicted_total.inc();
                self.view.write().await.remove(descriptor.remote().id);
            }
            Ok(reply) => {
                let candidates =
                    establish_candidates(&self.view, request.source.id, &reply.nodes).await;
                let mut view = self.view.write().await;
                view.merge(candidates);
                self.metrics.partial_view_size.set(view.len() as i64);
            }
        }
    }
}

/// Establishes descriptors for the offered nodes that are neither us nor
/// already in the view. Unreachable candidates are skipped silently.
async fn establish_candidates(
    view: &SharedView,
    local_id: uuid::Uuid,
    offered: &[NodeRecord],
) -> Vec<Descriptor> {
    let existing = view.read().await.ids();
    let mut candidates = Vec::new();
    for node in offered {
        if node.id == local_id || existing.contains(&node.id) {
            continue;
        }
        match Descriptor::establish(node.clone(), local_id).await {
            Ok(descriptor) => candidates.push(descriptor),
            Err(error) => debug!(peer = %node.id, %error, "skipping unreachable candidate"),
        }
    }
    candidates
}

// ---------------------------------------------------------------------------
// Vivaldi loop
// ---------------------------------------------------------------------------

/// The coordinate sampling client.
pub struct VivaldiLoop {
    /// The shared partial view.
    pub view: SharedView,
    /// The shared spring engine.
    pub engine: SharedVivaldi,
    /// The shared RTT filter.
    pub filter: Arc<RttFilter>,
    /// The publication detector; owned by this loop alone.
    pub stabilizer: Stabilizer,
    /// The configured coordinate space.
    pub space: SpaceContext,
    /// Sampling interval in seconds.
    pub interval_secs: u64,
    /// The results CSV appender.
    pub results: ResultWriter,
    /// Node metrics.
    pub metrics: SharedMetrics,
}

impl VivaldiLoop {
    /// Runs forever. One spring step per interval.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.round().await;
        }
    }

    async fn round(&mut self) {
        let Some(descriptor) = self.view.write().await.random_descriptor() else {
            return;
        };
        let peer = descriptor.remote().id;

        let started = Instant::now();
        let pulled = descriptor.channels().pull_coordinates().await;
        let rtt = started.elapsed();

        let wire = match pulled {
            Err(error) => {
                warn!(%peer, %error, "coordinate pull failed; evicting peer");
                self.metrics.peers_evicted_total.inc();
                self.view.write().await.remove(peer);
                return;
            }
            Ok(wire) => wire,
        };

        let remote = match self.space.from_values(&wire.values) {
            Ok(remote) => remote,
            Err(error) => {
                warn!(%peer, %error, "peer speaks a different coordinate space; ignoring sample");
                return;
            }
        };

        self.metrics.rtt_seconds.observe(rtt.as_secs_f64());
        let filtered = self.filter.filter(peer, rtt.as_secs_f64() * 1000.0);

        // The only block that holds the engine's write lock: one update.
        let (sample, error_estimate, predicted) = {
            let mut engine = self.engine.write();
            let predicted = engine.update(&remote, wire.error, filtered);
            (
                engine.system_coordinate().clone(),
                engine.error_estimate(),
                predicted,
            )
        };

        if let Some(rewrite) = self.stabilizer.observe(&sample) {
            self.engine.write().set_system_coordinate(rewrite);
        }

        self.results.append(error_estimate);
        self.metrics.vivaldi_rounds_total.inc();
        self.metrics.vivaldi_error.set(error_estimate);
        debug!(
            %peer,
            filtered_ms = filtered,
            predicted_ms = predicted,
            error = error_estimate,
            "spring step applied"
        );
    }
}

// ---------------------------------------------------------------------------
// Gossip loop
// ---------------------------------------------------------------------------

/// The epidemic exchange client.
pub struct GossipLoop {
    /// The shared partial view.
    pub view: SharedView,
    /// The shared epidemic engine.
    pub engine: Arc<GossipEngine>,
    /// The shared RTT filter; gossip RTTs are extra samples for it.
    pub filter: Arc<RttFilter>,
    /// Sampling interval in seconds.
    pub interval_secs: u64,
    /// Node metrics.
    pub metrics: SharedMetrics,
}

impl GossipLoop {
    /// Runs forever. One exchange per interval.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.round().await;
        }
    }

    async fn round(&self) {
        let Some(descriptor) = self.view.write().await.random_descriptor() else {
            return;
        };
        let peer = descriptor.remote().id;
        let payload = self.engine.select_coordinates();

        let started = Instant::now();
        let exchanged = descriptor.channels().gossip(&payload).await;
        let rtt = started.elapsed();
        self.filter.filter(peer, rtt.as_secs_f64() * 1000.0);

        match exchanged {
            Err(error) => {
                warn!(%peer, %error, "gossip exchange failed; evicting peer");
                self.metrics.peers_evicted_total.inc();
                self.view.write().await.remove(peer);
                self.engine.purge_peer(peer);
            }
            Ok(reply) => {
                self.engine.update(&reply.records);
                self.metrics.rtt_seconds.observe(rtt.as_secs_f64());
                self.metrics.gossip_rounds_total.inc();
                self.metrics.store_records.set(self.engine.store().len() as i64);
                debug!(
                    %peer,
                    sent = payload.records.len(),
                    echoes = reply.records.len(),
                    stored = self.engine.store().len(),
                    "gossip round complete"
                );
            }
        }
    }
}
