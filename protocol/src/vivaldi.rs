//! # Vivaldi Coordinate Engine
//!
//! The spring-relaxation model. Each node maintains one continuously
//! updated *system coordinate* with a companion error confidence in [0, 1]
//! (1 = no confidence, the starting state). A measurement against peer *j*
//! with coordinate `x_j`, confidence `e_j`, and filtered RTT `r` applies:
//!
//! ```text
//! w    = e_i / (e_i + e_j)                 sample weight
//! eps  = |dist(x_i, x_j) - r| / r          relative sample error
//! a    = ce * w
//! e_i' = clamp(a * eps + (1 - a) * e_i, 0, 1)
//! d    = cc * w * (r - dist(x_i, x_j))
//! x_i' = x_i + d * unit(x_i - x_j)
//! ```
//!
//! A node that measures a shorter RTT than its coordinate distance is
//! pulled toward the peer; a longer RTT pushes it away, each scaled by how
//! much this node trusts itself relative to the peer.
//!
//! The engine is pure state + arithmetic. The node binary wraps it in a
//! reader/writer lock: the pull server takes read locks, the sampling loop
//! takes a write lock for exactly the duration of one `update` call.

use crate::coord::{Coordinate, SpaceContext};
use crate::wire::WireCoordinate;

/// The spring-model state for one node.
#[derive(Debug)]
pub struct VivaldiEngine {
    space: SpaceContext,
    system: Coordinate,
    error: f64,
    cc: f64,
    ce: f64,
}

impl VivaldiEngine {
    /// Creates an engine with a random initial coordinate (each axis drawn
    /// from U(0, 1)) and an error confidence of 1.
    pub fn new(space: SpaceContext, cc: f64, ce: f64) -> Self {
        Self {
            space,
            system: space.random_point(),
            error: 1.0,
            cc,
            ce,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_state(space: SpaceContext, cc: f64, ce: f64, system: Coordinate) -> Self {
        Self {
            space,
            system,
            error: 1.0,
            cc,
            ce,
        }
    }

    /// The current system coordinate.
    pub fn system_coordinate(&self) -> &Coordinate {
        &self.system
    }

    /// The current error confidence in [0, 1].
    pub fn error_estimate(&self) -> f64 {
        self.error
    }

    /// Overwrites the system coordinate. The stabilizer uses this when its
    /// relative heuristic snaps the drifting coordinate to the current
    /// window centroid.
    pub fn set_system_coordinate(&mut self, coordinate: Coordinate) {
        self.system = coordinate;
    }

    /// The wire form of the current state, served by the pull endpoint.
    pub fn wire_coordinate(&self) -> WireCoordinate {
        self.space.encode(&self.system, self.error)
    }

    /// Applies one spring step against a peer measurement.
    ///
    /// `rtt_ms` must already be filtered. Returns the RTT the coordinates
    /// predicted before the step, for observability.
    pub fn update(&mut self, remote: &Coordinate, remote_error: f64, rtt_ms: f64) -> f64 {
        let predicted = self.space.distance(&self.system, remote);

        let weight = self.error / (self.error + remote_error);
        let sample_error = (predicted - rtt_ms).abs() / rtt_ms;

        let alpha = self.ce * weight;
        self.error = (alpha * sample_error + (1.0 - alpha) * self.error).clamp(0.0, 1.0);

        let magnitude = self.cc * weight * (rtt_ms - predicted);
        let direction = self
            .space
            .unit_vector(&self.space.subtract(&self.system, remote));
        self.system = self
            .space
            .add(&self.system, &self.space.scale(&direction, magnitude));

        predicted
    }
}
