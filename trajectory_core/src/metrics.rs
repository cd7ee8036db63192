//! Fit and accuracy metrics: speed fit error of an ego run, RMSE against
//! ground truth.

use crate::types::{EgoState, SurroundingState};
use sensor_models::EgoSample;
use serde::{Deserialize, Serialize};

/// Σ|v̂ − v| over the samples whose raw speed is valid, and the number of
/// such samples. `states` must be aligned with `samples`.
pub fn speed_fit_error(states: &[EgoState], samples: &[EgoSample]) -> (f64, usize) {
    states
        .iter()
        .zip(samples)
        .filter(|(_, s)| s.has_speed())
        .fold((0.0, 0), |(sum, n), (est, s)| {
            (sum + (est.v - s.speed_mps()).abs(), n + 1)
        })
}

/// Accumulated squared errors of a reconstructed trajectory.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryErrors {
    /// Number of compared timesteps
    pub n_matched: u64,
    /// Sum of squared 2D position errors (m²)
    pub sum_sq_pos_err: f64,
    /// Sum of squared speed errors ((m/s)²)
    pub sum_sq_speed_err: f64,
    /// Sum of squared wrapped heading errors (rad²)
    pub sum_sq_heading_err: f64,
}

impl TrajectoryErrors {
    /// Root-mean-square position error (m).
    pub fn rmse_position(&self) -> f64 {
        self.rmse(self.sum_sq_pos_err)
    }

    /// Root-mean-square speed error (m/s).
    pub fn rmse_speed(&self) -> f64 {
        self.rmse(self.sum_sq_speed_err)
    }

    /// Root-mean-square heading error (rad).
    pub fn rmse_heading(&self) -> f64 {
        self.rmse(self.sum_sq_heading_err)
    }

    fn rmse(&self, sum: f64) -> f64 {
        if self.n_matched == 0 {
            return 0.0;
        }
        (sum / self.n_matched as f64).sqrt()
    }

    /// Add one compared timestep.
    pub fn accumulate(&mut self, dx: f64, dy: f64, dv: f64, dpsi: f64) {
        self.sum_sq_pos_err += dx * dx + dy * dy;
        self.sum_sq_speed_err += dv * dv;
        self.sum_sq_heading_err += dpsi * dpsi;
        self.n_matched += 1;
    }

    pub fn accumulate_ego(&mut self, estimate: &EgoState, truth: &EgoState) {
        self.accumulate(
            estimate.x - truth.x,
            estimate.y - truth.y,
            estimate.v - truth.v,
            crate::types::wrap_angle(estimate.psi - truth.psi),
        );
    }

    pub fn accumulate_surrounding(&mut self, estimate: &SurroundingState, truth: &SurroundingState) {
        self.accumulate(
            estimate.x - truth.x,
            estimate.y - truth.y,
            estimate.v - truth.v,
            crate::types::wrap_angle(estimate.psi - truth.psi),
        );
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &TrajectoryErrors) {
        self.n_matched += other.n_matched;
        self.sum_sq_pos_err += other.sum_sq_pos_err;
        self.sum_sq_speed_err += other.sum_sq_speed_err;
        self.sum_sq_heading_err += other.sum_sq_heading_err;
    }
}
