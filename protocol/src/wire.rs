//! # Wire Protocol Definitions
//!
//! Type-safe definitions for the three RPC services every node hosts. The
//! actual HTTP servers live in the node binary (using axum); this module
//! only defines the JSON bodies and the endpoint paths, so library code,
//! servers, and client stubs all agree on one vocabulary.
//!
//! ## Service Index
//!
//! | Method | Path                     | Body → Reply                          |
//! |--------|--------------------------|---------------------------------------|
//! | POST   | `/membership/shuffle`    | [`ShuffleRequest`] → [`ShuffleReply`] |
//! | GET    | `/vivaldi/coordinates`   | — → [`WireCoordinate`]                |
//! | POST   | `/gossip/exchange`       | [`GossipPayload`] → [`GossipPayload`] |
//!
//! Feedback counters never appear on the wire — they are local epidemic
//! state. A gossip record carries only the coordinate values, the origin
//! node, and the origin's publication timestamp.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Path of the membership shuffle endpoint.
pub const SHUFFLE_PATH: &str = "/membership/shuffle";

/// Path of the Vivaldi coordinate pull endpoint.
pub const PULL_COORDINATES_PATH: &str = "/vivaldi/coordinates";

/// Path of the gossip exchange endpoint.
pub const GOSSIP_PATH: &str = "/gossip/exchange";

// ---------------------------------------------------------------------------
// Node record
// ---------------------------------------------------------------------------

/// A node's identity plus the addresses of its three service endpoints.
///
/// This is the record exchanged in shuffle messages and attached to every
/// gossip record. The addresses are per-service because each service binds
/// its own port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable node identity.
    pub id: Uuid,
    /// Membership (shuffle) endpoint.
    pub membership_addr: SocketAddr,
    /// Vivaldi (coordinate pull) endpoint.
    pub vivaldi_addr: SocketAddr,
    /// Gossip (epidemic exchange) endpoint.
    pub gossip_addr: SocketAddr,
}

impl NodeRecord {
    /// A placeholder record with the nil id and unspecified addresses.
    ///
    /// Used as the initial nearest-neighbor owner; the nil id can never
    /// appear in the coordinate store, so the neighbor accessors report
    /// "none" until a real candidate arrives.
    pub fn unknown() -> Self {
        let unspecified: SocketAddr = "0.0.0.0:0".parse().expect("static addr");
        Self {
            id: Uuid::nil(),
            membership_addr: unspecified,
            vivaldi_addr: unspecified,
            gossip_addr: unspecified,
        }
    }
}

// ---------------------------------------------------------------------------
// Membership service
// ---------------------------------------------------------------------------

/// Request body of `POST /membership/shuffle`.
///
/// Servers reject requests whose `nodes` list is longer than the configured
/// view capacity `c` — no state changes on rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShuffleRequest {
    /// The sender's shuffle sample; the first entry is the sender itself.
    pub nodes: Vec<NodeRecord>,
    /// The sending node.
    pub source: NodeRecord,
}

/// Reply body of `POST /membership/shuffle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShuffleReply {
    /// The receiver's own shuffle sample.
    pub nodes: Vec<NodeRecord>,
}

// ---------------------------------------------------------------------------
// Vivaldi service
// ---------------------------------------------------------------------------

/// A coordinate plus error confidence, as returned by
/// `GET /vivaldi/coordinates`.
///
/// `values` has the configured dimension, or dimension + 1 in height mode
/// with the height last; both sides must be configured for the same space
/// for the encoding to be unambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCoordinate {
    /// Coordinate values in wire layout.
    pub values: Vec<f64>,
    /// Error confidence in [0, 1]; 1 means "no confidence at all".
    pub error: f64,
}

// ---------------------------------------------------------------------------
// Gossip service
// ---------------------------------------------------------------------------

/// One disseminated application coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireGossipRecord {
    /// Coordinate values in wire layout.
    pub values: Vec<f64>,
    /// The origin node the coordinate belongs to.
    pub node: NodeRecord,
    /// The origin's publication timestamp. Per-origin comparisons are
    /// strictly "after"; nothing is ordered across origins.
    pub time: DateTime<Utc>,
}

/// Body of `POST /gossip/exchange`, in both directions.
///
/// The request carries the sender's selection of infected records; the
/// reply carries the echo list — records for which the sender's copy was
/// stale, telling it to stop spreading a superseded version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipPayload {
    /// The records being exchanged.
    pub records: Vec<WireGossipRecord>,
}
