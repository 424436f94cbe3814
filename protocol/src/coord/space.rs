//! # Coordinate Space Algebra
//!
//! A network coordinate is a point in a low-dimensional metric space chosen
//! so that coordinate distance predicts round-trip latency. Two variants
//! coexist behind one capability set:
//!
//! - **Euclidean** — distance is plain L2 on the point.
//! - **Height-vector** — each coordinate carries a non-negative scalar
//!   *height* modeling access-link latency; distance is L2 on the point
//!   component plus the sum of both heights.
//!
//! Rather than a process-wide singleton, every component that creates,
//! measures, or (de)serializes coordinates is handed a [`SpaceContext`]
//! carrying the configured variant and dimension. All arithmetic dispatches
//! on that context.
//!
//! ## Identities
//!
//! The Euclidean variant is a true metric: `distance(a, a) = 0`,
//! `distance(a, b) = distance(b, a)`, `scale(c, 1) = c`, and
//! `add(a, subtract(b, a)) = b`. The height variant relaxes the first and
//! last of these — heights fold with an absolute value on `add` and are
//! *summed* (not cancelled) by `distance`, so `distance(a, a) = 2·height(a)`
//! and `add(a, subtract(b, a))` recovers `b`'s point but not its height.
//! Symmetry and the scale identity hold in both variants.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::WireCoordinate;

// ---------------------------------------------------------------------------
// Space kind
// ---------------------------------------------------------------------------

/// The coordinate-space variant a deployment runs in.
///
/// Both sides of every RPC must agree on the kind for the wire encoding to
/// be unambiguous — the height variant appends the height as the final
/// element of the wire values array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    /// Plain d-dimensional Euclidean space.
    Euclidean,
    /// Euclidean space augmented with a height scalar per coordinate.
    HeightEuclidean,
}

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

/// A position in the configured coordinate space.
///
/// Constructed only through a [`SpaceContext`], which guarantees the variant
/// and dimension match the deployment configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Coordinate {
    /// A point in plain Euclidean space.
    Euclidean {
        /// The position vector, `dimension` elements long.
        point: Vec<f64>,
    },
    /// A point plus an access-link height.
    HeightVector {
        /// The position vector, `dimension` elements long.
        point: Vec<f64>,
        /// Scalar height above the Euclidean plane.
        height: f64,
    },
}

impl Coordinate {
    /// The position vector (without the height component).
    pub fn point(&self) -> &[f64] {
        match self {
            Self::Euclidean { point } => point,
            Self::HeightVector { point, .. } => point,
        }
    }

    /// The height component. Zero for the Euclidean variant.
    pub fn height(&self) -> f64 {
        match self {
            Self::Euclidean { .. } => 0.0,
            Self::HeightVector { height, .. } => *height,
        }
    }

    /// Number of axes in the position vector.
    pub fn dimension(&self) -> usize {
        self.point().len()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to decode a coordinate from its wire representation.
///
/// Dimension mismatches between two in-process coordinates are a programmer
/// error and panic instead; this error covers data that arrived from a peer.
#[derive(Debug, Error)]
pub enum SpaceError {
    /// The wire values array has the wrong length for the configured space.
    #[error("wire coordinate has {got} values, expected {expected}")]
    WireLength {
        /// The length the configured space requires.
        expected: usize,
        /// The length actually received.
        got: usize,
    },
}

// ---------------------------------------------------------------------------
// SpaceContext
// ---------------------------------------------------------------------------

/// The configured coordinate space: variant plus dimension.
///
/// Cheap to copy; handed to every component that touches coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceContext {
    kind: SpaceKind,
    dimension: usize,
}

impl SpaceContext {
    /// Creates a context for `dimension`-axis coordinates of the given kind.
    pub fn new(kind: SpaceKind, dimension: usize) -> Self {
        assert!(dimension > 0, "coordinate dimension must be positive");
        Self { kind, dimension }
    }

    /// The space variant.
    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    /// Number of axes in the position vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Length of the wire values array: `d`, or `d + 1` with the height last.
    pub fn wire_len(&self) -> usize {
        match self.kind {
            SpaceKind::Euclidean => self.dimension,
            SpaceKind::HeightEuclidean => self.dimension + 1,
        }
    }

    fn make(&self, point: Vec<f64>, height: f64) -> Coordinate {
        debug_assert_eq!(point.len(), self.dimension);
        match self.kind {
            SpaceKind::Euclidean => Coordinate::Euclidean { point },
            SpaceKind::HeightEuclidean => Coordinate::HeightVector { point, height },
        }
    }

    /// The origin coordinate (zero on every axis, zero height).
    pub fn zero(&self) -> Coordinate {
        self.make(vec![0.0; self.dimension], 0.0)
    }

    /// The sentinel coordinate at +∞ on every axis.
    ///
    /// Used as the initial nearest-neighbor so that any real candidate,
    /// whose distance is finite, wins the first comparison.
    pub fn infinite(&self) -> Coordinate {
        self.make(vec![f64::INFINITY; self.dimension], f64::INFINITY)
    }

    /// A random coordinate with every axis (and height) drawn from U(0, 1).
    /// Seeds the Vivaldi system coordinate at startup.
    pub fn random_point(&self) -> Coordinate {
        let mut rng = rand::thread_rng();
        let point = (0..self.dimension).map(|_| rng.gen::<f64>()).collect();
        self.make(point, rng.gen::<f64>())
    }

    /// A uniformly random unit vector.
    ///
    /// Axes are drawn from U(-0.5, 0.5) (height from U(0, 1)) and the result
    /// is normalized; an all-zero draw is re-drawn.
    pub fn random_unit_vector(&self) -> Coordinate {
        let mut rng = rand::thread_rng();
        loop {
            let point: Vec<f64> = (0..self.dimension)
                .map(|_| rng.gen::<f64>() - 0.5)
                .collect();
            let height = rng.gen::<f64>();
            let candidate = self.make(point, height);
            if self.fold_norm(&candidate) > 0.0 {
                return self.normalize(&candidate);
            }
        }
    }

    /// Decodes a coordinate from its wire values array.
    ///
    /// In height mode the final element is the height. Rejects arrays whose
    /// length does not match the configured space.
    pub fn from_values(&self, values: &[f64]) -> Result<Coordinate, SpaceError> {
        if values.len() != self.wire_len() {
            return Err(SpaceError::WireLength {
                expected: self.wire_len(),
                got: values.len(),
            });
        }
        Ok(match self.kind {
            SpaceKind::Euclidean => self.make(values.to_vec(), 0.0),
            SpaceKind::HeightEuclidean => {
                self.make(values[..self.dimension].to_vec(), values[self.dimension])
            }
        })
    }

    /// Encodes a coordinate into its wire values array.
    pub fn values(&self, coord: &Coordinate) -> Vec<f64> {
        let mut values = coord.point().to_vec();
        if self.kind == SpaceKind::HeightEuclidean {
            values.push(coord.height());
        }
        values
    }

    /// Encodes a coordinate plus error confidence into the wire form.
    pub fn encode(&self, coord: &Coordinate, error: f64) -> WireCoordinate {
        WireCoordinate {
            values: self.values(coord),
            error,
        }
    }

    fn check_dimension(&self, a: &Coordinate, b: &Coordinate) {
        assert_eq!(
            a.dimension(),
            b.dimension(),
            "coordinates have different dimensions"
        );
    }

    /// Distance between two coordinates: L2 on the points, plus the sum of
    /// both heights in the height variant.
    pub fn distance(&self, a: &Coordinate, b: &Coordinate) -> f64 {
        self.check_dimension(a, b);
        let l2 = a
            .point()
            .iter()
            .zip(b.point())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt();
        match self.kind {
            SpaceKind::Euclidean => l2,
            SpaceKind::HeightEuclidean => l2 + a.height() + b.height(),
        }
    }

    /// Componentwise sum. Heights fold as `|h_a + h_b|` so the result never
    /// carries a negative height.
    pub fn add(&self, a: &Coordinate, b: &Coordinate) -> Coordinate {
        self.check_dimension(a, b);
        let point = a.point().iter().zip(b.point()).map(|(x, y)| x + y).collect();
        self.make(point, (a.height() + b.height()).abs())
    }

    /// Componentwise difference. Heights are summed (a displacement through
    /// two access links traverses both).
    pub fn subtract(&self, a: &Coordinate, b: &Coordinate) -> Coordinate {
        self.check_dimension(a, b);
        let point = a.point().iter().zip(b.point()).map(|(x, y)| x - y).collect();
        self.make(point, a.height() + b.height())
    }

    /// Scalar multiplication of point and height.
    pub fn scale(&self, coord: &Coordinate, scalar: f64) -> Coordinate {
        let point = coord.point().iter().map(|x| x * scalar).collect();
        self.make(point, coord.height() * scalar)
    }

    /// Centroid of a non-empty list: mean point and mean height.
    ///
    /// Calling this with an empty list is a programmer error.
    pub fn centroid(&self, coords: &[Coordinate]) -> Coordinate {
        assert!(!coords.is_empty(), "centroid of an empty coordinate list");
        let mut point = vec![0.0; self.dimension];
        let mut height = 0.0;
        for coord in coords {
            for (axis, value) in point.iter_mut().zip(coord.point()) {
                *axis += value;
            }
            height += coord.height();
        }
        let n = coords.len() as f64;
        for axis in point.iter_mut() {
            *axis /= n;
        }
        self.make(point, height / n)
    }

    /// Norm used for normalization: `||p||` plus `|h|` in the height variant.
    fn fold_norm(&self, coord: &Coordinate) -> f64 {
        let l2 = coord.point().iter().map(|x| x * x).sum::<f64>().sqrt();
        match self.kind {
            SpaceKind::Euclidean => l2,
            SpaceKind::HeightEuclidean => l2 + coord.height().abs(),
        }
    }

    fn normalize(&self, coord: &Coordinate) -> Coordinate {
        let norm = self.fold_norm(coord);
        let point = coord.point().iter().map(|x| x / norm).collect();
        self.make(point, coord.height() / norm)
    }

    /// The unit vector of a coordinate.
    ///
    /// The unit vector of the zero coordinate is a freshly drawn random unit
    /// vector, so a spring update between two coincident nodes still pushes
    /// them apart instead of stalling on a division by zero.
    pub fn unit_vector(&self, coord: &Coordinate) -> Coordinate {
        if self.fold_norm(coord) == 0.0 {
            self.random_unit_vector()
        } else {
            self.normalize(coord)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn euclidean() -> SpaceContext {
        SpaceContext::new(SpaceKind::Euclidean, 3)
    }

    fn height() -> SpaceContext {
        SpaceContext::new(SpaceKind::HeightEuclidean, 3)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn euclidean_distance_identities() {
        let space = euclidean();
        let a = space.from_values(&[1.0, 2.0, 3.0]).unwrap();
        let b = space.from_values(&[4.0, 6.0, 3.0]).unwrap();

        assert!(close(space.distance(&a, &a), 0.0));
        assert!(close(space.distance(&a, &b), space.distance(&b, &a)));
        assert!(close(space.distance(&a, &b), 5.0));
    }

    #[test]
    fn euclidean_algebra_identities() {
        let space = euclidean();
        let a = space.from_values(&[1.0, -2.0, 0.5]).unwrap();
        let b = space.from_values(&[3.0, 7.0, -1.5]).unwrap();

        assert_eq!(space.scale(&a, 1.0), a);

        // add(a, subtract(b, a)) = b
        let recovered = space.add(&a, &space.subtract(&b, &a));
        for (x, y) in recovered.point().iter().zip(b.point()) {
            assert!(close(*x, *y));
        }
    }

    #[test]
    fn height_distance_sums_heights() {
        let space = height();
        let a = space.from_values(&[0.0, 0.0, 0.0, 2.0]).unwrap();
        let b = space.from_values(&[3.0, 4.0, 0.0, 1.5]).unwrap();

        // L2 = 5, plus both heights.
        assert!(close(space.distance(&a, &b), 8.5));
        // The height variant is not a metric: self-distance is 2h.
        assert!(close(space.distance(&a, &a), 4.0));
        // Symmetry still holds.
        assert!(close(space.distance(&a, &b), space.distance(&b, &a)));
    }

    #[test]
    fn height_add_folds_absolute() {
        let space = height();
        let a = space.from_values(&[1.0, 0.0, 0.0, 0.5]).unwrap();
        let b = space.from_values(&[1.0, 1.0, 0.0, -2.0]).unwrap();

        let sum = space.add(&a, &b);
        assert!(close(sum.height(), 1.5), "height must fold to |h_a + h_b|");

        // Scale keeps the identity in both variants.
        assert_eq!(space.scale(&a, 1.0), a);
    }

    #[test]
    fn unit_vector_has_unit_norm() {
        let space = euclidean();
        let c = space.from_values(&[3.0, 4.0, 12.0]).unwrap();
        let unit = space.unit_vector(&c);
        let norm = unit.point().iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!(close(norm, 1.0));
    }

    #[test]
    fn unit_vector_of_zero_is_random_unit() {
        let space = euclidean();
        let unit = space.unit_vector(&space.zero());
        let norm = unit.point().iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!(close(norm, 1.0));
    }

    #[test]
    fn height_unit_vector_folds_height_into_norm() {
        let space = height();
        let c = space.from_values(&[3.0, 0.0, 0.0, 1.0]).unwrap();
        // norm = ||p|| + h = 4
        let unit = space.unit_vector(&c);
        assert!(close(unit.point()[0], 0.75));
        assert!(close(unit.height(), 0.25));
    }

    #[test]
    fn centroid_averages_points_and_heights() {
        let space = height();
        let a = space.from_values(&[0.0, 0.0, 0.0, 1.0]).unwrap();
        let b = space.from_values(&[2.0, 4.0, 6.0, 3.0]).unwrap();

        let mid = space.centroid(&[a, b]);
        assert_eq!(mid.point(), &[1.0, 2.0, 3.0]);
        assert!(close(mid.height(), 2.0));
    }

    #[test]
    fn wire_roundtrip_height_mode() {
        let space = height();
        let coord = space.from_values(&[1.0, 2.0, 3.0, 0.25]).unwrap();
        assert_eq!(coord.dimension(), 3);
        assert!(close(coord.height(), 0.25));
        assert_eq!(space.values(&coord), vec![1.0, 2.0, 3.0, 0.25]);
    }

    #[test]
    fn wire_length_is_validated() {
        let space = euclidean();
        let err = space.from_values(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            SpaceError::WireLength {
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    #[should_panic(expected = "different dimensions")]
    fn dimension_mismatch_is_fatal() {
        let big = SpaceContext::new(SpaceKind::Euclidean, 4);
        let small = euclidean();
        let a = big.from_values(&[0.0; 4]).unwrap();
        let b = small.from_values(&[0.0; 3]).unwrap();
        big.distance(&a, &b);
    }

    #[test]
    fn infinite_sentinel_loses_to_any_real_coordinate() {
        let space = euclidean();
        let origin = space.zero();
        let real = space.from_values(&[10.0, 10.0, 10.0]).unwrap();
        assert!(space.distance(&space.infinite(), &origin) > space.distance(&real, &origin));
    }
}
