//! # SIR Gossip Engine
//!
//! Rumor mongering with at-most-N feedback semantics. Every application
//! coordinate this node knows about is, per origin, in exactly one of three
//! epidemic states:
//!
//! - **susceptible** — never seen; not tracked.
//! - **infected** — actively spread: eligible for selection each round.
//! - **removed** — spreading finished; kept only to recognize stale copies.
//!
//! A record enters *infected* with a feedback counter of F. Every time a
//! peer sends us a copy we already have (same origin, not newer), the
//! counter is decremented and the newer copy is echoed back; at zero the
//! record moves to *removed* in the same atomic step. Receiving a strictly
//! newer timestamp for an origin re-infects it with a full counter.
//!
//! Counters live behind the map entry and are mutated in place, so the
//! decrement a server handler applies is the decrement the next selection
//! observes. `infected` and `removed` are disjoint by origin at all times.
//!
//! The engine performs no I/O: servers and client loops hand it wire
//! records and ship back whatever it returns.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::coord::{Coordinate, SpaceContext};
use crate::gossip::{CoordinateStore, GossipRecord};
use crate::wire::{GossipPayload, NodeRecord, WireGossipRecord};

/// The epidemic state machine plus its backing coordinate store.
pub struct GossipEngine {
    state: RwLock<SirState>,
    store: Arc<CoordinateStore>,
    space: SpaceContext,
    local_node: NodeRecord,
    max_feedback: u32,
    fanout: usize,
}

struct SirState {
    infected: HashMap<Uuid, GossipRecord>,
    removed: HashMap<Uuid, GossipRecord>,
}

impl GossipEngine {
    /// Creates an engine for `local_node` with feedback budget
    /// `max_feedback` (F) and per-round selection cap `fanout`.
    pub fn new(
        space: SpaceContext,
        local_node: NodeRecord,
        store: Arc<CoordinateStore>,
        max_feedback: u32,
        fanout: usize,
    ) -> Self {
        Self {
            state: RwLock::new(SirState {
                infected: HashMap::new(),
                removed: HashMap::new(),
            }),
            store,
            space,
            local_node,
            max_feedback,
            fanout,
        }
    }

    /// The configured feedback budget F.
    pub fn max_feedback(&self) -> u32 {
        self.max_feedback
    }

    /// The backing coordinate store.
    pub fn store(&self) -> &Arc<CoordinateStore> {
        &self.store
    }

    /// The nearest-neighbor coordinate, if one is known.
    pub fn neighbor_coordinate(&self) -> Option<Coordinate> {
        self.store.neighbor_coordinate()
    }

    /// Builds this round's outgoing payload: all infected records, or a
    /// uniform sample of `fanout` of them when more are infected.
    pub fn select_coordinates(&self) -> GossipPayload {
        let state = self.state.read();
        let records = if state.infected.len() <= self.fanout {
            state
                .infected
                .values()
                .map(|r| r.to_wire(&self.space))
                .collect()
        } else {
            state
                .infected
                .values()
                .choose_multiple(&mut rand::thread_rng(), self.fanout)
                .into_iter()
                .map(|r| r.to_wire(&self.space))
                .collect()
        };
        GossipPayload { records }
    }

    /// Applies a batch of received records and returns the echo list:
    /// our newer copies of every record the sender offered stale.
    ///
    /// Records whose coordinate values do not match the configured space
    /// are dropped with a warning — a peer on a different space
    /// configuration cannot be merged meaningfully.
    pub fn update(&self, received: &[WireGossipRecord]) -> GossipPayload {
        let mut state = self.state.write();
        let mut echoes = Vec::new();

        for wire in received {
            let record = match GossipRecord::from_wire(wire, &self.space, self.max_feedback) {
                Ok(record) => record,
                Err(error) => {
                    warn!(origin = %wire.node.id, %error, "dropping undecodable gossip record");
                    continue;
                }
            };
            if let Some(echo) = self.apply(&mut state, record) {
                echoes.push(echo);
            }
        }

        GossipPayload { records: echoes }
    }

    /// Hands a locally published application coordinate to the epidemic.
    ///
    /// Same path as a received record: the fresh timestamp re-infects this
    /// node's own origin with a full feedback budget, and the store (but
    /// not the neighbor — a node is never its own neighbor) is updated.
    pub fn publish(&self, record: GossipRecord) {
        let mut state = self.state.write();
        self.apply(&mut state, record);
    }

    /// Forgets everything about `peer`: epidemic state in both maps.
    /// Called when an RPC to that peer fails and it is evicted.
    pub fn purge_peer(&self, peer: Uuid) {
        let mut state = self.state.write();
        state.infected.remove(&peer);
        state.removed.remove(&peer);
    }

    /// Origins currently in the infected state. Diagnostic/test helper.
    pub fn infected_origins(&self) -> Vec<Uuid> {
        self.state.read().infected.keys().copied().collect()
    }

    /// Origins currently in the removed state. Diagnostic/test helper.
    pub fn removed_origins(&self) -> Vec<Uuid> {
        self.state.read().removed.keys().copied().collect()
    }

    /// One SIR transition for one received record. Returns the echo, if
    /// the sender's copy was stale.
    ///
    /// Anything that is not a stale copy of an infected record re-infects
    /// the origin: a newer timestamp (whether the origin was infected,
    /// removed, or unseen) and also a copy of a removed origin — the
    /// epidemic would rather respread than lose a coordinate.
    fn apply(&self, state: &mut SirState, received: GossipRecord) -> Option<WireGossipRecord> {
        let origin = received.origin();

        match state.infected.get_mut(&origin) {
            Some(existing) if received.time <= existing.time => {
                existing.counter = existing.counter.saturating_sub(1);
                let echo = existing.to_wire(&self.space);
                if existing.counter == 0 {
                    // Spreading budget exhausted: removed, atomically with
                    // the decrement that spent the last unit.
                    let record = state
                        .infected
                        .remove(&origin)
                        .expect("entry matched above");
                    debug!(%origin, "record exhausted its feedback budget");
                    state.removed.insert(origin, record);
                }
                Some(echo)
            }
            _ => {
                self.add_infected(state, received);
                None
            }
        }
    }

    /// Moves `record` into the infected map with a full feedback budget and
    /// mirrors it into the store. Clears any removed entry for the origin —
    /// the two maps stay disjoint.
    fn add_infected(&self, state: &mut SirState, mut record: GossipRecord) {
        record.counter = self.max_feedback;
        state.removed.remove(&record.origin());
        self.update_store(state, &record);
        state.infected.insert(record.origin(), record);
    }

    /// Mirrors a record into the store (with counter 0 — the store tracks
    /// no epidemic state) and, when it came from another origin and this
    /// node has a published application coordinate, offers it as a
    /// nearest-neighbor candidate.
    fn update_store(&self, state: &SirState, record: &GossipRecord) {
        let mut stored = record.clone();
        stored.counter = 0;
        self.store.save(stored);

        if record.origin() == self.local_node.id {
            return;
        }
        if let Some(own) = self.published_record(state) {
            self.store.update_neighbor(record, &own.coord);
        }
    }

    /// This node's currently published application coordinate, from either
    /// epidemic map.
    fn published_record<'a>(&self, state: &'a SirState) -> Option<&'a GossipRecord> {
        state
            .infected
            .get(&self.local_node.id)
            .or_else(|| state.removed.get(&self.local_node.id))
    }
}
