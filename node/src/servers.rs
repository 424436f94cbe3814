//! # Protocol Servers
//!
//! Builds the three axum routers a node hosts, one per service port:
//!
//! | Method | Path                    | Service                       |
//! |--------|-------------------------|-------------------------------|
//! | POST   | `/membership/shuffle`   | Cyclon view exchange          |
//! | GET    | `/vivaldi/coordinates`  | System-coordinate pull        |
//! | POST   | `/gossip/exchange`      | SIR epidemic exchange         |
//!
//! Handlers are short and lock-scoped: the shuffle handler establishes
//! stubs for its candidates *before* taking the view's write lock, the
//! pull handler takes a read lock for one encode, and the gossip handler
//! is a single atomic engine update. Request cancellation is structural —
//! axum drops the handler future when the client goes away.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::debug;

use atlas_protocol::gossip::GossipEngine;
use atlas_protocol::membership::{Descriptor, PartialView};
use atlas_protocol::vivaldi::VivaldiEngine;
use atlas_protocol::wire::{
    GossipPayload, ShuffleReply, ShuffleRequest, WireCoordinate, GOSSIP_PATH,
    PULL_COORDINATES_PATH, SHUFFLE_PATH,
};

use crate::metrics::SharedMetrics;

/// The partial view, shared between the shuffle server and client loops.
/// A tokio lock because the shuffle path holds it across candidate setup.
pub type SharedView = Arc<tokio::sync::RwLock<PartialView>>;

/// The Vivaldi engine behind its reader/writer lock: the pull server takes
/// read locks, the sampling loop write-locks for single updates.
pub type SharedVivaldi = Arc<parking_lot::RwLock<VivaldiEngine>>;

// ---------------------------------------------------------------------------
// Membership service
// ---------------------------------------------------------------------------

/// State for the membership router.
#[derive(Clone)]
pub struct MembershipState {
    /// The shared partial view.
    pub view: SharedView,
    /// Node metrics, for the view-size gauge.
    pub metrics: SharedMetrics,
}

/// Builds the membership router.
pub fn membership_router(state: MembershipState) -> Router {
    Router::new()
        .route(SHUFFLE_PATH, post(shuffle_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /membership/shuffle` — answer with our own sample, then merge the
/// sender's.
///
/// A payload larger than the view capacity is a protocol violation:
/// rejected with 400 and no state change.
async fn shuffle_handler(
    State(state): State<MembershipState>,
    Json(request): Json<ShuffleRequest>,
) -> Result<Json<ShuffleReply>, StatusCode> {
    let (capacity, local_id, existing) = {
        let view = state.view.read().await;
        (view.capacity(), view.local_node().id, view.ids())
    };

    if request.nodes.len() > capacity {
        debug!(
            sender = %request.source.id,
            offered = request.nodes.len(),
            capacity,
            "rejecting oversized shuffle payload"
        );
        return Err(StatusCode::BAD_REQUEST);
    }

    // Establish stubs for the unfamiliar candidates before touching the
    // write lock; unreachable candidates are skipped silently.
    let mut candidates = Vec::new();
    for node in &request.nodes {
        if node.id == local_id || existing.contains(&node.id) {
            continue;
        }
        match Descriptor::establish(node.clone(), local_id).await {
            Ok(descriptor) => candidates.push(descriptor),
            Err(error) => {
                debug!(peer = %node.id, %error, "skipping unreachable shuffle candidate");
            }
        }
    }

    let mut view = state.view.write().await;
    let nodes = view.sending_nodes();
    view.merge(candidates);
    state.metrics.partial_view_size.set(view.len() as i64);

    Ok(Json(ShuffleReply { nodes }))
}

// ---------------------------------------------------------------------------
// Vivaldi service
// ---------------------------------------------------------------------------

/// State for the Vivaldi router.
#[derive(Clone)]
pub struct VivaldiState {
    /// The shared spring engine.
    pub engine: SharedVivaldi,
}

/// Builds the Vivaldi router.
pub fn vivaldi_router(state: VivaldiState) -> Router {
    Router::new()
        .route(PULL_COORDINATES_PATH, get(pull_coordinates_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /vivaldi/coordinates` — the current system coordinate with its
/// error confidence. Stateless; one read lock.
async fn pull_coordinates_handler(State(state): State<VivaldiState>) -> Json<WireCoordinate> {
    Json(state.engine.read().wire_coordinate())
}

// ---------------------------------------------------------------------------
// Gossip service
// ---------------------------------------------------------------------------

/// State for the gossip router.
#[derive(Clone)]
pub struct GossipState {
    /// The shared epidemic engine.
    pub engine: Arc<GossipEngine>,
    /// Node metrics, for the store-size gauge.
    pub metrics: SharedMetrics,
}

/// Builds the gossip router.
pub fn gossip_router(state: GossipState) -> Router {
    Router::new()
        .route(GOSSIP_PATH, post(gossip_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /gossip/exchange` — one atomic SIR update; the reply is the echo
/// list for records the sender offered stale.
async fn gossip_handler(
    State(state): State<GossipState>,
    Json(payload): Json<GossipPayload>,
) -> Json<GossipPayload> {
    let echoes = state.engine.update(&payload.records);
    state.metrics.store_records.set(state.engine.store().len() as i64);
    Json(echoes)
}
