//! # Partial View (Cyclon Peer Sampling)
//!
//! A bounded list of at most *c* peer descriptors that approximates a
//! uniform random sample of the live fleet. The membership loop keeps it
//! fresh by shuffling subsets with random peers; every other subsystem
//! draws its random peer from here.
//!
//! Three invariants hold after every merge:
//!
//! 1. the view holds at most `c` descriptors,
//! 2. it never contains this node's own id,
//! 3. no id appears twice.
//!
//! The view-selection policy fixes the *healer* and *swapper* biases:
//! healers evict the oldest entries by age, swappers evict the
//! longest-resident entries by position, protecting fresh arrivals.
//!
//! Sampling uses a deterministically seeded RNG so shuffle behavior is
//! reproducible in tests.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::config::ViewSelection;
use crate::membership::Descriptor;
use crate::wire::NodeRecord;

/// Seed for the view's shuffle RNG.
const SHUFFLE_RNG_SEED: u64 = 42;

/// The bounded, shuffled peer sample.
#[derive(Debug)]
pub struct PartialView {
    capacity: usize,
    healers: usize,
    swappers: usize,
    local_node: NodeRecord,
    descriptors: Vec<Descriptor>,
    rng: StdRng,
}

impl PartialView {
    /// Creates an empty view of capacity `c` under the given policy.
    pub fn new(local_node: NodeRecord, c: usize, policy: ViewSelection) -> Self {
        let healers = policy.healers(c);
        let swappers = policy.swappers(c);
        assert!(c > 0, "view capacity must be positive");
        assert!(healers + swappers <= c, "H + S must not exceed c");
        Self {
            capacity: c,
            healers,
            swappers,
            local_node,
            descriptors: Vec::with_capacity(c * 2),
            rng: StdRng::seed_from_u64(SHUFFLE_RNG_SEED),
        }
    }

    /// The configured capacity `c`.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of descriptors currently held.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the view holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// This node's own record.
    pub fn local_node(&self) -> &NodeRecord {
        &self.local_node
    }

    /// Whether a descriptor for `id` is present.
    pub fn contains(&self, id: Uuid) -> bool {
        self.descriptors.iter().any(|d| d.remote.id == id)
    }

    /// Snapshot of the ids currently in the view.
    pub fn ids(&self) -> HashSet<Uuid> {
        self.descriptors.iter().map(|d| d.remote.id).collect()
    }

    /// A uniformly random descriptor, if the view is non-empty.
    pub fn random_descriptor(&mut self) -> Option<Descriptor> {
        if self.descriptors.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.descriptors.len());
        Some(self.descriptors[index].clone())
    }

    /// Builds the shuffle payload.
    ///
    /// Returns exactly `k = min(|view|, c/2)` records (at least one), the
    /// first of which is this node. The remainder is drawn from the
    /// *younger half* — the `min(|view|, c − H)` youngest entries by age —
    /// falling back to the older suffix only when the younger half cannot
    /// fill the sample. Which side of the descriptor is sent depends on the
    /// branch: a sample filled from the younger half alone carries remote
    /// records, while the overflow branch sends the local-side record for
    /// every younger entry (teaching the receiver the asymmetric return
    /// path) and remote records for the older remainder.
    pub fn sending_nodes(&mut self) -> Vec<NodeRecord> {
        if self.descriptors.is_empty() {
            return vec![self.local_node.clone()];
        }

        let k = (self.descriptors.len().min(self.capacity / 2)).max(1);
        let mut nodes = Vec::with_capacity(k);
        nodes.push(self.local_node.clone());

        let mut by_age: Vec<&Descriptor> = self.descriptors.iter().collect();
        by_age.sort_by_key(|d| d.age);

        let cut = self.descriptors.len().min(self.capacity - self.healers);
        let local_id = self.local_node.id;
        let mut younger: Vec<&Descriptor> = by_age[..cut]
            .iter()
            .filter(|d| d.remote.id != local_id)
            .copied()
            .collect();
        let mut older: Vec<&Descriptor> = by_age[cut..]
            .iter()
            .filter(|d| d.remote.id != local_id)
            .copied()
            .collect();

        if k - 1 <= younger.len() {
            younger.shuffle(&mut self.rng);
            nodes.extend(younger.iter().take(k - 1).map(|d| d.remote.clone()));
        } else {
            let need = k - 1 - younger.len();
            nodes.extend(younger.iter().map(|d| d.local.clone()));
            older.shuffle(&mut self.rng);
            nodes.extend(older.iter().take(need).map(|d| d.remote.clone()));
        }

        nodes
    }

    /// Merges already-established candidate descriptors into the view.
    ///
    /// Candidates equal to this node or already present by id are skipped.
    /// While the view exceeds `c`, eviction applies in order: up to `S`
    /// longest-resident entries from the head, then (after an ascending
    /// sort by age) up to `H` oldest entries from the tail, then uniformly
    /// random drops. Finally every surviving age is rebased so the youngest
    /// descriptor sits at age 0.
    pub fn merge(&mut self, candidates: Vec<Descriptor>) {
        for candidate in candidates {
            if candidate.remote.id == self.local_node.id || self.contains(candidate.remote.id) {
                continue;
            }
            self.descriptors.push(candidate);
        }

        if self.descriptors.len() > self.capacity {
            let dropping = self.swappers.min(self.descriptors.len() - self.capacity);
            self.descriptors.drain(..dropping);
        }

        self.descriptors.sort_by_key(|d| d.age);

        if self.descriptors.len() > self.capacity {
            let dropping = self.healers.min(self.descriptors.len() - self.capacity);
            self.descriptors.truncate(self.descriptors.len() - dropping);
        }

        while self.descriptors.len() > self.capacity {
            let index = self.rng.gen_range(0..self.descriptors.len());
            self.descriptors.remove(index);
        }

        if let Some(min_age) = self.descriptors.iter().map(|d| d.age).min() {
            for descriptor in &mut self.descriptors {
                descriptor.age = descriptor.age.saturating_sub(min_age + 1);
            }
        }
    }

    /// Expels the descriptor for `id`, dropping its cached stubs.
    ///
    /// Called by the client loops when an RPC to that peer fails.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.descriptors.len();
        self.descriptors.retain(|d| d.remote.id != id);
        self.descriptors.len() != before
    }

    /// Ages every descriptor by one round. The membership client loop calls
    /// this once per shuffle round.
    pub fn bump_ages(&mut self) {
        for descriptor in &mut self.descriptors {
            descriptor.age += 1;
        }
    }

    /// Ages of the held descriptors, in view order. Test/diagnostic helper.
    pub fn ages(&self) -> Vec<u64> {
        self.descriptors.iter().map(|d| d.age).collect()
    }
}
