//! # Stabilizer
//!
//! Decides when the continuously drifting *system* coordinate deserves to
//! be published as a new *application* coordinate, and hands publications
//! to the gossip engine.
//!
//! Two FIFO windows of size W collect recent system samples: the
//! *start window* (the first W samples after each reset, whose centroid is
//! then frozen) and the *current window* (sliding). Once both are full,
//! every new sample is judged by two heuristics:
//!
//! - **Relative** — if the current centroid has moved, relative to the
//!   distance between the frozen centroid and the nearest known neighbor,
//!   by more than ε_r, the whole neighborhood reference frame says the
//!   motion matters: the *system* coordinate is snapped to the current
//!   centroid and a publication fires.
//! - **Energy** — the mean cross-window displacement energy
//!   `E = (2·Σd(s,c) − Σd(s,s) − Σd(c,c)) / 2W`; exceeding τ means the
//!   windows genuinely sit in different places: the *application*
//!   coordinate becomes the current centroid and a publication fires.
//!
//! Either trigger clears both windows and republishes. Independently, a
//! liveness refresh republishes the unchanged application coordinate
//! whenever none has been sent for a quarter of the gossip retention
//! horizon, so the fleet never forgets a stable node.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::coord::{Coordinate, SpaceContext};
use crate::gossip::{GossipEngine, GossipRecord};
use crate::time::Clock;
use crate::wire::NodeRecord;

/// Windowed drift detector promoting system → application coordinates.
pub struct Stabilizer {
    space: SpaceContext,
    window_size: usize,
    tau: f64,
    epsilon_r: f64,
    start_window: Vec<Coordinate>,
    current_window: Vec<Coordinate>,
    start_centroid: Option<Coordinate>,
    app_coord: Coordinate,
    last_publication: DateTime<Utc>,
    republish_after: Duration,
    local_node: NodeRecord,
    gossip: Arc<GossipEngine>,
    clock: Arc<dyn Clock>,
}

impl Stabilizer {
    /// Creates a stabilizer publishing into `gossip`.
    ///
    /// `retention_seconds` is the gossip store's retention horizon; the
    /// liveness refresh fires after a quarter of it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        space: SpaceContext,
        window_size: usize,
        tau: f64,
        epsilon_r: f64,
        retention_seconds: u64,
        local_node: NodeRecord,
        gossip: Arc<GossipEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        assert!(window_size > 0, "stabilizer window size must be positive");
        Self {
            space,
            window_size,
            tau,
            epsilon_r,
            start_window: Vec::with_capacity(window_size),
            current_window: Vec::with_capacity(window_size),
            start_centroid: None,
            app_coord: space.zero(),
            last_publication: clock.now(),
            republish_after: Duration::seconds((retention_seconds / 4) as i64),
            local_node,
            gossip,
            clock,
        }
    }

    /// The current application coordinate.
    pub fn app_coordinate(&self) -> &Coordinate {
        &self.app_coord
    }

    /// Feeds one new system-coordinate sample.
    ///
    /// Returns the replacement system coordinate when the relative
    /// heuristic fired — the caller installs it into the Vivaldi engine
    /// under its own write lock.
    pub fn observe(&mut self, sample: &Coordinate) -> Option<Coordinate> {
        debug_assert_eq!(self.start_window.len(), self.current_window.len());

        if self.clock.now() - self.last_publication > self.republish_after {
            debug!("liveness refresh: republishing application coordinate");
            self.publish();
        }

        if self.start_window.len() < self.window_size {
            self.start_window.push(sample.clone());
            self.current_window.push(sample.clone());
            if self.start_window.len() == self.window_size {
                self.start_centroid = Some(self.space.centroid(&self.start_window));
            }
            return None;
        }

        self.current_window.remove(0);
        self.current_window.push(sample.clone());
        let current_centroid = self.space.centroid(&self.current_window);

        let rewrite = self.check_relative(&current_centroid);
        let energy = self.check_energy(&current_centroid);

        if rewrite.is_some() || energy {
            debug!(
                relative = rewrite.is_some(),
                energy, "stabilizer trigger: publishing application coordinate"
            );
            self.start_window.clear();
            self.current_window.clear();
            self.start_centroid = None;
            self.publish();
        }

        rewrite
    }

    /// Relative heuristic: motion of the current centroid measured against
    /// the distance to the nearest known neighbor. Needs a neighbor; quiet
    /// until gossip has produced one.
    fn check_relative(&self, current_centroid: &Coordinate) -> Option<Coordinate> {
        let neighbor = self.gossip.neighbor_coordinate()?;
        let start_centroid = self.start_centroid.as_ref()?;

        let drift = self.space.distance(start_centroid, current_centroid);
        let reference = self.space.distance(start_centroid, &neighbor);
        (drift / reference > self.epsilon_r).then(|| current_centroid.clone())
    }

    /// Energy heuristic: mean cross-window displacement energy above τ
    /// promotes the current centroid to application coordinate.
    fn check_energy(&mut self, current_centroid: &Coordinate) -> bool {
        let w = self.window_size as f64;
        let cross = self.sum_of_distances(&self.start_window, &self.current_window);
        let within_start = self.sum_of_distances(&self.start_window, &self.start_window);
        let within_current = self.sum_of_distances(&self.current_window, &self.current_window);

        let energy = (2.0 * cross - within_start - within_current) / (2.0 * w);
        if energy > self.tau {
            self.app_coord = current_centroid.clone();
            true
        } else {
            false
        }
    }

    fn sum_of_distances(&self, left: &[Coordinate], right: &[Coordinate]) -> f64 {
        left.iter()
            .flat_map(|a| right.iter().map(move |b| self.space.distance(a, b)))
            .sum()
    }

    /// Stamps and hands the application coordinate to the gossip engine
    /// with a full feedback budget.
    fn publish(&mut self) {
        let now = self.clock.now();
        self.last_publication = now;
        self.gossip.publish(GossipRecord::new(
            self.local_node.clone(),
            self.app_coord.clone(),
            now,
            self.gossip.max_feedback(),
        ));
    }
}
