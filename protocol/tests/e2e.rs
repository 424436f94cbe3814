//! End-to-end integration tests for the ATLAS protocol engines.
//!
//! These tests compose the real components — coordinate space, filters,
//! Vivaldi engines, stabilizers, SIR gossip engines, and stores — into a
//! small in-process fleet and drive them the way the node binary's client
//! loops do, with direct calls standing in for the HTTP hops. They prove
//! the subsystems agree on one vocabulary: spring steps move coordinates
//! toward their true distances, stabilized publications flow through the
//! epidemic into every store, and feedback silences stale spreaders.
//!
//! Each test builds its own fleet. No shared state, no ordering
//! dependencies.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use atlas_protocol::coord::{RttFilter, SpaceContext, SpaceKind};
use atlas_protocol::gossip::{CoordinateStore, GossipEngine, GossipRecord};
use atlas_protocol::stabilizer::Stabilizer;
use atlas_protocol::time::{Clock, ManualClock};
use atlas_protocol::vivaldi::VivaldiEngine;
use atlas_protocol::wire::NodeRecord;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const FEEDBACK: u32 = 3;
const FANOUT: usize = 5;

fn space() -> SpaceContext {
    SpaceContext::new(SpaceKind::Euclidean, 2)
}

fn node(id: u128) -> NodeRecord {
    NodeRecord {
        id: Uuid::from_u128(id),
        membership_addr: "127.0.0.1:50152".parse().unwrap(),
        vivaldi_addr: "127.0.0.1:50153".parse().unwrap(),
        gossip_addr: "127.0.0.1:50154".parse().unwrap(),
    }
}

/// One in-process node: gossip engine and stabilizer sharing a store and a
/// manual clock.
struct TestNode {
    record: NodeRecord,
    gossip: Arc<GossipEngine>,
    stabilizer: Stabilizer,
}

fn build_node(id: u128, clock: &Arc<ManualClock>) -> TestNode {
    let record = node(id);
    let store = Arc::new(CoordinateStore::new(
        space(),
        Arc::clone(clock) as Arc<dyn Clock>,
        3600,
    ));
    let gossip = Arc::new(GossipEngine::new(
        space(),
        record.clone(),
        store,
        FEEDBACK,
        FANOUT,
    ));
    let stabilizer = Stabilizer::new(
        space(),
        3,
        1.0,
        f64::INFINITY,
        3600,
        record.clone(),
        Arc::clone(&gossip),
        Arc::clone(clock) as Arc<dyn Clock>,
    );
    TestNode {
        record,
        gossip,
        stabilizer,
    }
}

/// One gossip round from `sender` to `receiver`: select, deliver, apply the
/// echoes. Mirrors the client loop minus the socket.
fn gossip_round(sender: &TestNode, receiver: &TestNode) {
    let payload = sender.gossip.select_coordinates();
    let echoes = receiver.gossip.update(&payload.records);
    sender.gossip.update(&echoes.records);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn spring_model_converges_toward_true_latency() {
    let mut a = VivaldiEngine::new(space(), 0.25, 0.25);
    let mut b = VivaldiEngine::new(space(), 0.25, 0.25);
    let filter = RttFilter::raw();
    let (a_id, b_id) = (Uuid::from_u128(1), Uuid::from_u128(2));
    let true_rtt = 40.0;

    for _ in 0..300 {
        // A measures against B, exactly as its client loop would.
        let remote = b.wire_coordinate();
        let coord = space().from_values(&remote.values).unwrap();
        a.update(&coord, remote.error, filter.filter(b_id, true_rtt));

        // And B against A.
        let remote = a.wire_coordinate();
        let coord = space().from_values(&remote.values).unwrap();
        b.update(&coord, remote.error, filter.filter(a_id, true_rtt));
    }

    let predicted = space().distance(a.system_coordinate(), b.system_coordinate());
    assert!(
        (predicted - true_rtt).abs() < 4.0,
        "after 300 rounds the coordinate distance ({predicted:.1} ms) should \
         approximate the true RTT ({true_rtt} ms)"
    );
    assert!(a.error_estimate() < 0.5, "confidence should improve");
}

#[test]
fn published_coordinates_spread_through_the_epidemic() {
    let clock = ManualClock::new(Utc::now());
    let mut a = build_node(1, &clock);
    let b = build_node(2, &clock);
    let c = build_node(3, &clock);

    // Drive node A's stabilizer over the energy threshold so it publishes:
    // three samples at the origin fill the windows, and the first far
    // sample lifts the cross-window energy (30/3 = 10) over tau = 1. The
    // published application coordinate is the current-window centroid,
    // (0, 10).
    for _ in 0..3 {
        a.stabilizer.observe(&space().from_values(&[0.0, 0.0]).unwrap());
    }
    clock.advance(Duration::seconds(1));
    a.stabilizer.observe(&space().from_values(&[0.0, 30.0]).unwrap());
    assert_eq!(a.gossip.infected_origins(), vec![a.record.id]);

    // Two rounds of pairwise gossip reach the whole triangle.
    gossip_round(&a, &b);
    gossip_round(&b, &c);

    for peer in [&b, &c] {
        let stored = peer
            .gossip
            .store()
            .read(a.record.id)
            .expect("A's application coordinate should have spread");
        assert_eq!(stored.coord.point(), a.stabilizer.app_coordinate().point());
        assert_eq!(stored.coord.point(), &[0.0, 10.0]);
    }
}

#[test]
fn stale_spreaders_are_silenced_by_feedback() {
    let clock = ManualClock::new(Utc::now());
    let a = build_node(1, &clock);
    let b = build_node(2, &clock);

    // A publishes at t0; B learns it.
    let t0 = clock.now();
    a.gossip.publish(GossipRecord::new(
        a.record.clone(),
        space().from_values(&[1.0, 1.0]).unwrap(),
        t0,
        FEEDBACK,
    ));
    gossip_round(&a, &b);

    // A republishes newer; B's next offer of the stale copy comes back as
    // an echo carrying the fresh record, re-infecting B with it.
    clock.advance(Duration::seconds(5));
    a.gossip.publish(GossipRecord::new(
        a.record.clone(),
        space().from_values(&[2.0, 2.0]).unwrap(),
        clock.now(),
        FEEDBACK,
    ));

    let stale = b.gossip.select_coordinates();
    let echoes = a.gossip.update(&stale.records);
    assert_eq!(echoes.records.len(), 1, "A echoes its newer copy");
    b.gossip.update(&echoes.records);

    let stored = b.gossip.store().read(a.record.id).unwrap();
    assert_eq!(stored.coord.point(), &[2.0, 2.0]);
}

#[test]
fn neighbor_tracking_follows_the_closest_published_origin() {
    let clock = ManualClock::new(Utc::now());
    let a = build_node(1, &clock);
    let b = build_node(2, &clock);
    let c = build_node(3, &clock);

    // Everyone publishes an application coordinate.
    for (peer, point) in [(&a, [0.0, 0.0]), (&b, [3.0, 0.0]), (&c, [100.0, 0.0])] {
        peer.gossip.publish(GossipRecord::new(
            peer.record.clone(),
            space().from_values(&point).unwrap(),
            clock.now(),
            FEEDBACK,
        ));
        clock.advance(Duration::seconds(1));
    }

    // A hears from both B and C.
    gossip_round(&b, &a);
    gossip_round(&c, &a);

    let neighbor = a.gossip.neighbor_coordinate().expect("neighbor seated");
    assert_eq!(neighbor.point(), &[3.0, 0.0], "B is closer to A than C");
}

#[test]
fn retention_sweep_forgets_silent_origins() {
    let clock = ManualClock::new(Utc::now());
    let store = Arc::new(CoordinateStore::new(
        space(),
        Arc::clone(&clock) as Arc<dyn Clock>,
        60,
    ));
    let gossip = GossipEngine::new(space(), node(1), store, FEEDBACK, FANOUT);

    gossip.publish(GossipRecord::new(
        node(9),
        space().from_values(&[5.0, 5.0]).unwrap(),
        clock.now(),
        FEEDBACK,
    ));
    assert_eq!(gossip.store().len(), 1);

    clock.advance(Duration::seconds(120));
    gossip.store().sweep();
    assert_eq!(gossip.store().len(), 0, "silent origins age out of the store");
}
