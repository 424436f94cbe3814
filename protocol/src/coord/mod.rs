//! # Coordinate Module
//!
//! The geometric substrate of the protocol: the coordinate-space algebra
//! ([`space`]) and the RTT latency filters ([`filter`]) that turn raw
//! round-trip samples into distances the spring model can trust.

pub mod filter;
pub mod space;

pub use filter::RttFilter;
pub use space::{Coordinate, SpaceContext, SpaceError, SpaceKind};
