//! Onboard radar measurement simulator.
//!
//! Generates the raw returns of the nose and tail radars:
//! - geometry from the ego truth pose (mount point, azimuth, range-rate)
//! - range and field-of-view limits
//! - miss probability (1 - P_D)
//! - uniform range, range-rate and azimuth noise

use crate::target::SimTarget;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use sensor_models::{units::m_to_ft, RadarParams, RadarReturn, SensorDirection};
use trajectory_core::{CoordinateProjector, EgoState};

/// Generates radar returns from a set of targets.
pub struct RadarSimulator {
    pub radars: Vec<RadarParams>,
    projector: CoordinateProjector,
    rng: ChaCha8Rng,
}

impl RadarSimulator {
    /// `ego_length` places the radars on the nose and tail.
    pub fn new(radars: Vec<RadarParams>, ego_length: f64, seed: u64) -> Self {
        Self {
            radars,
            projector: CoordinateProjector::new(ego_length, 1),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn uniform(&mut self, half_width: f64) -> f64 {
        self.rng.gen::<f64>() * half_width * 2.0 - half_width
    }

    /// All returns of every radar for one scan at `time`, seen from `ego`.
    pub fn scan(&mut self, time: f64, ego: &EgoState, targets: &[SimTarget]) -> Vec<(SensorDirection, RadarReturn)> {
        let mut out = Vec::new();
        for i in 0..self.radars.len() {
            let params = self.radars[i].clone();
            for target in targets {
                if !target.is_active(time) {
                    continue;
                }
                let (vx, vy) = target.velocity();
                let exact = self.projector.synthesize_return(
                    ego,
                    time,
                    (target.state.x, target.state.y, vx, vy),
                    params.direction,
                    target.channel,
                );

                // Check range and FoV
                let range = exact.range_m();
                if !params.covers(range, exact.azimuth) {
                    continue;
                }
                // Miss detection?
                if self.rng.gen::<f64>() > params.p_detection {
                    continue;
                }

                let noisy_range = range + self.uniform(params.range_noise);
                let noisy_rate = exact.range_rate_mps() + self.uniform(params.range_rate_noise);
                let noisy_az = exact.azimuth + self.uniform(params.azimuth_noise);
                out.push((
                    params.direction,
                    RadarReturn {
                        time,
                        range: m_to_ft(noisy_range.max(0.0)),
                        range_rate: m_to_ft(noisy_rate),
                        azimuth: noisy_az,
                        channel: target.channel,
                    },
                ));
            }
        }
        out
    }
}
