//! # Coordinate Store
//!
//! A thread-safe map from origin id to that origin's latest known
//! application coordinate, plus a distinguished *nearest neighbor* record.
//!
//! Three invariants:
//!
//! - the stored timestamp is monotone non-decreasing per origin,
//! - records older than the retention horizon are purged by a background
//!   sweep,
//! - the neighbor accessors only answer while the neighbor's id is still
//!   present in the map; a swept neighbor silently reads as "none".
//!
//! The initial neighbor sits at +∞ on every axis, so the first real
//! candidate — whose distance to anything is finite — always wins the
//! comparison in [`CoordinateStore::update_neighbor`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use parking_lot::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::coord::{Coordinate, SpaceContext};
use crate::gossip::GossipRecord;
use crate::time::Clock;
use crate::wire::NodeRecord;

/// TTL-pruned map of application coordinates with a nearest-neighbor seat.
pub struct CoordinateStore {
    inner: RwLock<StoreInner>,
    space: SpaceContext,
    clock: Arc<dyn Clock>,
    retention: ChronoDuration,
}

struct StoreInner {
    records: HashMap<Uuid, GossipRecord>,
    neighbor: GossipRecord,
}

impl CoordinateStore {
    /// Creates an empty store with the given retention horizon.
    pub fn new(space: SpaceContext, clock: Arc<dyn Clock>, retention_seconds: u64) -> Self {
        let neighbor = GossipRecord::new(
            NodeRecord::unknown(),
            space.infinite(),
            clock.now(),
            0,
        );
        Self {
            inner: RwLock::new(StoreInner {
                records: HashMap::new(),
                neighbor,
            }),
            space,
            clock,
            retention: ChronoDuration::seconds(retention_seconds as i64),
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Ids of every origin with a stored coordinate.
    pub fn peers(&self) -> Vec<Uuid> {
        self.inner.read().records.keys().copied().collect()
    }

    /// Snapshot of every stored record.
    pub fn items(&self) -> Vec<GossipRecord> {
        self.inner.read().records.values().cloned().collect()
    }

    /// The record for `origin`, if present.
    pub fn read(&self, origin: Uuid) -> Option<GossipRecord> {
        self.inner.read().records.get(&origin).cloned()
    }

    /// Drops the record for `origin`.
    pub fn remove(&self, origin: Uuid) {
        self.inner.write().records.remove(&origin);
    }

    /// Inserts `record` unless an entry with an equal-or-newer timestamp is
    /// already present for that origin.
    pub fn save(&self, record: GossipRecord) {
        let mut inner = self.inner.write();
        match inner.records.get(&record.origin()) {
            Some(existing) if existing.time >= record.time => {}
            _ => {
                inner.records.insert(record.origin(), record);
            }
        }
    }

    /// Replaces the neighbor with `candidate` if it sits closer to this
    /// node's application coordinate than the current neighbor does.
    ///
    /// The neighbor seat always takes the map's copy of the candidate, so a
    /// concurrent save of a newer version is not shadowed by a stale clone.
    pub fn update_neighbor(&self, candidate: &GossipRecord, app_coord: &Coordinate) {
        let mut inner = self.inner.write();
        let current = self.space.distance(&inner.neighbor.coord, app_coord);
        let offered = self.space.distance(&candidate.coord, app_coord);
        if current > offered {
            if let Some(record) = inner.records.get(&candidate.origin()).cloned() {
                debug!(
                    neighbor = %record.origin(),
                    distance_ms = offered,
                    "nearest neighbor updated"
                );
                inner.neighbor = record;
            }
        }
    }

    /// The neighbor's coordinate, if the neighbor is still in the map.
    pub fn neighbor_coordinate(&self) -> Option<Coordinate> {
        let inner = self.inner.read();
        inner
            .records
            .contains_key(&inner.neighbor.origin())
            .then(|| inner.neighbor.coord.clone())
    }

    /// The neighbor's node record, if the neighbor is still in the map.
    pub fn neighbor_node(&self) -> Option<NodeRecord> {
        let inner = self.inner.read();
        inner
            .records
            .contains_key(&inner.neighbor.origin())
            .then(|| inner.neighbor.node.clone())
    }

    /// Removes every record older than the retention horizon. Returns how
    /// many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let retention = self.retention;
        let mut inner = self.inner.write();
        let before = inner.records.len();
        inner.records.retain(|_, record| now - record.time <= retention);
        before - inner.records.len()
    }

    /// Spawns the background retention sweeper, ticking every `interval`.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let dropped = self.sweep();
                if dropped > 0 {
                    trace!(dropped, "retention sweep purged stale coordinates");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::SpaceKind;
    use crate::time::ManualClock;
    use chrono::Utc;

    fn node(id: u128) -> NodeRecord {
        NodeRecord {
            id: Uuid::from_u128(id),
            membership_addr: "127.0.0.1:50152".parse().unwrap(),
            vivaldi_addr: "127.0.0.1:50153".parse().unwrap(),
            gossip_addr: "127.0.0.1:50154".parse().unwrap(),
        }
    }

    fn space() -> SpaceContext {
        SpaceContext::new(SpaceKind::Euclidean, 2)
    }

    fn store(clock: Arc<ManualClock>) -> CoordinateStore {
        CoordinateStore::new(space(), clock, 60)
    }

    fn record(clock: &ManualClock, id: u128, point: [f64; 2]) -> GossipRecord {
        GossipRecord::new(
            node(id),
            space().from_values(&point).unwrap(),
            clock.now(),
            0,
        )
    }

    #[test]
    fn save_is_monotone_per_origin() {
        let clock = ManualClock::new(Utc::now());
        let store = store(Arc::clone(&clock));

        let old = record(&clock, 1, [1.0, 1.0]);
        clock.advance(ChronoDuration::seconds(5));
        let new = record(&clock, 1, [2.0, 2.0]);

        store.save(new.clone());
        store.save(old); // stale: must not downgrade
        assert_eq!(store.read(Uuid::from_u128(1)).unwrap().time, new.time);

        clock.advance(ChronoDuration::seconds(5));
        let newest = record(&clock, 1, [3.0, 3.0]);
        store.save(newest.clone());
        assert_eq!(store.read(Uuid::from_u128(1)).unwrap().time, newest.time);
    }

    #[test]
    fn first_candidate_beats_the_infinite_sentinel() {
        let clock = ManualClock::new(Utc::now());
        let store = store(Arc::clone(&clock));
        let app = space().zero();

        assert!(store.neighbor_coordinate().is_none(), "sentinel is not a neighbor");

        let far = record(&clock, 1, [100.0, 100.0]);
        store.save(far.clone());
        store.update_neighbor(&far, &app);
        assert_eq!(store.neighbor_node().unwrap().id, Uuid::from_u128(1));

        // A closer candidate takes the seat; a farther one does not.
        let near = record(&clock, 2, [1.0, 0.0]);
        store.save(near.clone());
        store.update_neighbor(&near, &app);
        assert_eq!(store.neighbor_node().unwrap().id, Uuid::from_u128(2));

        let farther = record(&clock, 3, [500.0, 0.0]);
        store.save(farther.clone());
        store.update_neighbor(&farther, &app);
        assert_eq!(store.neighbor_node().unwrap().id, Uuid::from_u128(2));
    }

    #[test]
    fn neighbor_accessors_gate_on_map_membership() {
        let clock = ManualClock::new(Utc::now());
        let store = store(Arc::clone(&clock));
        let app = space().zero();

        let candidate = record(&clock, 1, [1.0, 0.0]);
        store.save(candidate.clone());
        store.update_neighbor(&candidate, &app);
        assert!(store.neighbor_coordinate().is_some());

        store.remove(Uuid::from_u128(1));
        assert!(store.neighbor_coordinate().is_none());
        assert!(store.neighbor_node().is_none());
    }

    #[test]
    fn sweep_purges_only_expired_records() {
        let clock = ManualClock::new(Utc::now());
        let store = store(Arc::clone(&clock));

        store.save(record(&clock, 1, [1.0, 1.0]));
        clock.advance(ChronoDuration::seconds(45));
        store.save(record(&clock, 2, [2.0, 2.0]));
        clock.advance(ChronoDuration::seconds(30));

        // Record 1 is now 75 s old, record 2 only 30 s.
        assert_eq!(store.sweep(), 1);
        assert!(store.read(Uuid::from_u128(1)).is_none());
        assert!(store.read(Uuid::from_u128(2)).is_some());
    }

    #[test]
    fn swept_neighbor_reads_as_none() {
        let clock = ManualClock::new(Utc::now());
        let store = store(Arc::clone(&clock));
        let app = space().zero();

        let candidate = record(&clock, 1, [1.0, 0.0]);
        store.save(candidate.clone());
        store.update_neighbor(&candidate, &app);

        clock.advance(ChronoDuration::seconds(120));
        store.sweep();
        assert!(store.neighbor_coordinate().is_none());
    }

    #[test]
    fn peers_and_items_report_contents() {
        let clock = ManualClock::new(Utc::now());
        let store = store(Arc::clone(&clock));

        store.save(record(&clock, 1, [1.0, 1.0]));
        store.save(record(&clock, 2, [2.0, 2.0]));

        assert_eq!(store.len(), 2);
        let mut peers = store.peers();
        peers.sort();
        assert_eq!(peers, vec![Uuid::from_u128(1), Uuid::from_u128(2)]);
        assert_eq!(store.items().len(), 2);
    }
}
