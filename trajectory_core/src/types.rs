//! Fundamental types used across the entire workspace.

use nalgebra::{Matrix4, Matrix6, Vector4, Vector6};
use sensor_models::SensorDirection;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalar type: f64 throughout for numerical precision in the filters.
// ---------------------------------------------------------------------------

/// Ego CTRA state vector: [x, y, ψ, v, ω, a]
pub type EgoVec = Vector6<f64>;

/// 6×6 ego state covariance
pub type EgoCov = Matrix6<f64>;

/// Surrounding CHCV state vector: [x, y, v, ψ]
pub type SurVec = Vector4<f64>;

/// 4×4 surrounding state covariance
pub type SurCov = Matrix4<f64>;

// ---------------------------------------------------------------------------
// Identifier types — newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TripId(pub u64);

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TargetId(pub u64);

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trip {}", self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

/// Hands out surrounding-vehicle identifiers that stay unique across trips.
///
/// Owned by whoever iterates over trips and passed down explicitly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetIdAllocator {
    next: u64,
}

impl TargetIdAllocator {
    pub fn new(first: u64) -> Self {
        Self { next: first }
    }

    pub fn allocate(&mut self) -> TargetId {
        let id = TargetId(self.next);
        self.next += 1;
        id
    }

    /// The identifier the next call to [`allocate`](Self::allocate) returns.
    pub fn peek(&self) -> TargetId {
        TargetId(self.next)
    }
}

// ---------------------------------------------------------------------------
// Angles
// ---------------------------------------------------------------------------

/// Wrap an angle into (−π, π].
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = PI - (PI - angle).rem_euclid(TAU);
    // rem_euclid may round up to TAU itself
    if wrapped <= -PI {
        PI
    } else {
        wrapped
    }
}

// ---------------------------------------------------------------------------
// Run direction
// ---------------------------------------------------------------------------

/// Order in which an ego run consumes its samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunDirection {
    /// Ascending time
    Forward,
    /// Descending time; the output is flipped back to ascending order
    Reverse,
}

impl fmt::Display for RunDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunDirection::Forward => f.write_str("forward"),
            RunDirection::Reverse => f.write_str("reverse"),
        }
    }
}

// ---------------------------------------------------------------------------
// Estimated states
// ---------------------------------------------------------------------------

/// Ego vehicle state as produced by the CTRA filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EgoState {
    /// Local-frame position (m)
    pub x: f64,
    pub y: f64,
    /// Heading (rad), in (−π, π]
    pub psi: f64,
    /// Speed (m/s), never negative
    pub v: f64,
    /// Yaw rate (rad/s)
    pub omega: f64,
    /// Longitudinal acceleration (m/s²)
    pub acc: f64,
}

impl EgoState {
    pub fn from_vector(x: &EgoVec) -> Self {
        Self {
            x: x[0],
            y: x[1],
            psi: x[2],
            v: x[3],
            omega: x[4],
            acc: x[5],
        }
    }

    pub fn to_vector(&self) -> EgoVec {
        EgoVec::new(self.x, self.y, self.psi, self.v, self.omega, self.acc)
    }

    /// Unit vector along the heading.
    pub fn heading_unit(&self) -> (f64, f64) {
        (self.psi.cos(), self.psi.sin())
    }

    /// World-frame velocity vector.
    pub fn velocity(&self) -> (f64, f64) {
        (self.v * self.psi.cos(), self.v * self.psi.sin())
    }
}

/// Surrounding vehicle state as produced by the CHCV filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SurroundingState {
    pub x: f64,
    pub y: f64,
    /// Speed (m/s), never negative
    pub v: f64,
    /// Heading (rad), in (−π, π]
    pub psi: f64,
}

impl SurroundingState {
    pub fn from_vector(x: &SurVec) -> Self {
        Self {
            x: x[0],
            y: x[1],
            v: x[2],
            psi: x[3],
        }
    }

    pub fn to_vector(&self) -> SurVec {
        SurVec::new(self.x, self.y, self.v, self.psi)
    }
}

/// A radar return after projection into the ego run's world frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurroundingObservation {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    /// Absolute speed magnitude (m/s); the heading is not observable
    pub speed: f64,
    pub target_id: TargetId,
    pub direction: SensorDirection,
}

// ---------------------------------------------------------------------------
// Output records
// ---------------------------------------------------------------------------

/// Per-timestep ego output consumed by event matching / export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EgoStateRecord {
    pub trip_id: TripId,
    pub sync: i64,
    pub time: f64,
    #[serde(flatten)]
    pub state: EgoState,
    /// Raw speed (m/s) for comparison; negative when it was missing
    pub speed_measured: f64,
    pub brake: Option<u8>,
    pub signal: Option<u8>,
    /// Inside the annotated event window
    pub in_event: bool,
}

/// Per-timestep surrounding vehicle output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurroundingStateRecord {
    pub trip_id: TripId,
    pub target_id: TargetId,
    pub time: f64,
    #[serde(flatten)]
    pub state: SurroundingState,
    /// Observed position/speed the filter was fed
    pub x_observed: f64,
    pub y_observed: f64,
    pub speed_observed: f64,
    pub forward: bool,
}
