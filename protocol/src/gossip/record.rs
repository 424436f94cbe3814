//! # Gossip Records
//!
//! A [`GossipRecord`] is one origin's application coordinate as tracked by
//! the epidemic: the origin node, the coordinate, the origin's publication
//! timestamp, and the local feedback counter.
//!
//! The counter is *local epidemic state* — it never crosses the wire. It is
//! owned by whichever map currently holds the record and is decremented in
//! place through the map entry, so a decrement observed by one code path is
//! seen by every other.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::coord::{Coordinate, SpaceContext, SpaceError};
use crate::wire::{NodeRecord, WireGossipRecord};

/// One origin's application coordinate plus local epidemic state.
#[derive(Debug, Clone)]
pub struct GossipRecord {
    /// The origin node.
    pub node: NodeRecord,
    /// The origin's application coordinate.
    pub coord: Coordinate,
    /// The origin's publication timestamp. Comparisons are strictly
    /// "after"; per-origin storage is monotone non-decreasing.
    pub time: DateTime<Utc>,
    /// Remaining spreading budget. Zero in the coordinate store, which does
    /// not track epidemic state.
    pub counter: u32,
}

impl GossipRecord {
    /// Creates a record.
    pub fn new(node: NodeRecord, coord: Coordinate, time: DateTime<Utc>, counter: u32) -> Self {
        Self {
            node,
            coord,
            time,
            counter,
        }
    }

    /// The origin's id — the key the epidemic and store maps use.
    pub fn origin(&self) -> Uuid {
        self.node.id
    }

    /// Decodes a wire record, attaching the given local counter.
    pub fn from_wire(
        wire: &WireGossipRecord,
        space: &SpaceContext,
        counter: u32,
    ) -> Result<Self, SpaceError> {
        Ok(Self {
            node: wire.node.clone(),
            coord: space.from_values(&wire.values)?,
            time: wire.time,
            counter,
        })
    }

    /// Encodes the record for the wire. The counter is dropped.
    pub fn to_wire(&self, space: &SpaceContext) -> WireGossipRecord {
        WireGossipRecord {
            values: space.values(&self.coord),
            node: self.node.clone(),
            time: self.time,
        }
    }
}
