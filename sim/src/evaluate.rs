//! Accuracy of a reconstruction against the simulator's ground truth.
//!
//! The reconstruction lives in the frame of its anchor sample: origin and
//! zero heading at the first sample of a forward run, at the last sample of
//! a reverse run. Truth is moved into that frame before comparing.

use crate::replay::GroundTruth;
use serde::{Deserialize, Serialize};
use trajectory_core::{
    metrics::TrajectoryErrors, types::wrap_angle, EgoState, RunDirection, SurroundingState,
    TripReconstruction,
};

/// Rigid transform from the simulation world frame into a run's frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorFrame {
    pub x: f64,
    pub y: f64,
    pub psi: f64,
}

impl AnchorFrame {
    pub fn of(truth: &GroundTruth, direction: RunDirection) -> Option<Self> {
        let anchor = match direction {
            RunDirection::Forward => truth.ego.first(),
            RunDirection::Reverse => truth.ego.last(),
        }?;
        Some(Self {
            x: anchor.x,
            y: anchor.y,
            psi: anchor.psi,
        })
    }

    /// Position and heading of a world pose in the anchor frame.
    pub fn apply(&self, x: f64, y: f64, psi: f64) -> (f64, f64, f64) {
        let (s, c) = self.psi.sin_cos();
        let (dx, dy) = (x - self.x, y - self.y);
        (c * dx + s * dy, -s * dx + c * dy, wrap_angle(psi - self.psi))
    }

    pub fn ego(&self, state: &EgoState) -> EgoState {
        let (x, y, psi) = self.apply(state.x, state.y, state.psi);
        EgoState { x, y, psi, ..*state }
    }

    pub fn surrounding(&self, state: &SurroundingState) -> SurroundingState {
        let (x, y, psi) = self.apply(state.x, state.y, state.psi);
        SurroundingState { x, y, psi, v: state.v }
    }
}

/// RMSE summary of one reconstructed trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub ego: TrajectoryErrors,
    pub surrounding: TrajectoryErrors,
    pub tracks: usize,
}

/// Compare every ego record and every surrounding record that has a truth
/// counterpart at the same time.
pub fn evaluate(truth: &GroundTruth, reconstruction: &TripReconstruction) -> Evaluation {
    let mut eval = Evaluation {
        tracks: reconstruction.tracks.len(),
        ..Default::default()
    };
    let Some(frame) = AnchorFrame::of(truth, reconstruction.direction) else {
        return eval;
    };

    for record in &reconstruction.ego {
        if let Some(k) = truth.index_of(record.time) {
            eval.ego.accumulate_ego(&record.state, &frame.ego(&truth.ego[k]));
        }
    }

    for track in &reconstruction.tracks {
        let Some(target) = truth.target(track.channel) else {
            continue;
        };
        for record in reconstruction.track(track.target_id) {
            if let Some(k) = truth.index_of(record.time) {
                eval.surrounding
                    .accumulate_surrounding(&record.state, &frame.surrounding(&target.states[k]));
            }
        }
    }
    eval
}
