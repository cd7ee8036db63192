//! Surrounding vehicle trajectory models and state propagation.
//!
//! Each target carries its true [`SurroundingState`] in the simulation world
//! frame and a [`TargetMotion`] describing how it moves. The radar channel it
//! is reported on upstream is fixed for the whole scenario.

use serde::{Deserialize, Serialize};
use trajectory_core::{types::wrap_angle, SurroundingState};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TargetMotion {
    /// Straight line at constant speed.
    ConstantVelocity,
    /// Constant turn rate `omega` (rad/s) at constant speed.
    ConstantTurn { omega: f64 },
}

/// A simulated surrounding vehicle with ground-truth state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimTarget {
    /// Upstream radar channel reporting this vehicle
    pub channel: u32,
    pub state: SurroundingState,
    pub motion: TargetMotion,
    /// Not reported before this time
    pub appear_at: Option<f64>,
    /// Not reported from this time on
    pub disappear_at: Option<f64>,
}

impl SimTarget {
    pub fn new(channel: u32, x: f64, y: f64, v: f64, psi: f64, motion: TargetMotion) -> Self {
        Self {
            channel,
            state: SurroundingState { x, y, v, psi },
            motion,
            appear_at: None,
            disappear_at: None,
        }
    }

    /// Propagate the true state by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let s = &mut self.state;
        let (sin, cos) = s.psi.sin_cos();
        s.x += s.v * cos * dt;
        s.y += s.v * sin * dt;
        if let TargetMotion::ConstantTurn { omega } = self.motion {
            s.psi = wrap_angle(s.psi + omega * dt);
        }
    }

    pub fn is_active(&self, t: f64) -> bool {
        self.appear_at.map_or(true, |appear| t >= appear)
            && self.disappear_at.map_or(true, |disappear| t < disappear)
    }

    /// World velocity (vx, vy).
    pub fn velocity(&self) -> (f64, f64) {
        let (sin, cos) = self.state.psi.sin_cos();
        (self.state.v * cos, self.state.v * sin)
    }
}
