//! `trajectory_core` — Offline trajectory reconstruction for an instrumented
//! vehicle and the vehicles its radars track.
//!
//! # Module layout
//! - [`types`]      — Fundamental types (IDs, state vectors, output records)
//! - [`error`]      — Typed faults of a filter run
//! - [`config`]     — Filter, selector and projection parameters
//! - [`preprocess`] — Unit conversion, gap filling, time checks
//! - [`ekf`]        — Shared EKF predict / correct recursion
//! - [`ctra`]       — Ego estimator (6-state CTRA EKF)
//! - [`chcv`]       — Surrounding-vehicle estimator (4-state CHCV EKF)
//! - [`direction`]  — Forward / reverse ego run selection
//! - [`projection`] — Radar-to-world coordinate projection
//! - [`pipeline`]   — Per-trip and batch orchestration
//! - [`metrics`]    — Speed fit error, RMSE against ground truth

pub mod chcv;
pub mod config;
pub mod ctra;
pub mod direction;
pub mod ekf;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod projection;
pub mod types;

pub use chcv::SurroundingStateEstimator;
pub use config::ReconstructionConfig;
pub use ctra::EgoStateEstimator;
pub use direction::{DirectionalRunSelector, EgoReconstruction, SelectedRun};
pub use error::{ReconstructError, Result};
pub use pipeline::{
    EventWindow, InvalidReason, InvalidTrip, ReconstructionReport, TripInput, TripOutcome,
    TripProcessor, TripReconstruction,
};
pub use projection::{CoordinateProjector, EgoTrajectory};
pub use types::{
    EgoState, EgoStateRecord, RunDirection, SurroundingObservation, SurroundingState,
    SurroundingStateRecord, TargetId, TargetIdAllocator, TripId,
};
