//! Surrounding vehicle estimator: Constant Heading and Velocity (CHCV) EKF.
//!
//! ## State vector
//! x = [px, py, v, ψ]ᵀ
//!
//! ## Motion model
//! px += v·cos ψ·dt, py += v·sin ψ·dt; v and ψ are random walks.
//!
//! ## Measurement
//! z = [px, py, |v|]ᵀ from the projected radar returns. Heading is never
//! measured; it is learned through the position/speed coupling of the
//! Jacobian, so it converges slowly from its initial value of zero.

use crate::{
    config::SurroundingFilterConfig,
    ekf::{self, Correction, Estimate, MotionModel},
    error::Result,
    preprocess::{check_time_order, step_intervals},
    types::{wrap_angle, SurCov, SurVec, SurroundingObservation, SurroundingState},
};
use nalgebra::{Matrix3, SMatrix, Vector3};
use std::f64::consts::PI;
use tracing::debug;

/// CHCV motion model with [px, py, v] observation.
#[derive(Clone, Debug)]
pub struct ChcvModel {
    pub config: SurroundingFilterConfig,
}

impl ChcvModel {
    pub fn new(config: SurroundingFilterConfig) -> Self {
        Self { config }
    }

    /// Observation Jacobian: all three rows while the speed reading is
    /// positive, otherwise zero.
    pub fn observation_matrix(active: bool) -> SMatrix<f64, 3, 4> {
        if active {
            SMatrix::<f64, 3, 4>::new(
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0,
            )
        } else {
            SMatrix::<f64, 3, 4>::zeros()
        }
    }
}

impl MotionModel<4> for ChcvModel {
    fn propagate(&self, x: &SurVec, dt: f64) -> SurVec {
        let (s, c) = x[3].sin_cos();
        SurVec::new(x[0] + x[2] * c * dt, x[1] + x[2] * s * dt, x[2], wrap_angle(x[3]))
    }

    fn jacobian(&self, x: &SurVec, dt: f64) -> SurCov {
        let (s, c) = x[3].sin_cos();
        let v = x[2];
        #[rustfmt::skip]
        let f = SurCov::new(
            1.0, 0.0, dt * c, -dt * v * s,
            0.0, 1.0, dt * s,  dt * v * c,
            0.0, 0.0, 1.0,     0.0,
            0.0, 0.0, 0.0,     1.0,
        );
        f
    }

    fn process_noise(&self, dt: f64) -> SurCov {
        let c = &self.config;
        let s_pos = 0.5 * c.max_acceleration * dt * dt;
        let s_speed = c.max_acceleration * dt;
        let s_psi = c.max_yaw_rate * dt;
        SurCov::from_diagonal(&SurVec::new(
            s_pos * s_pos,
            s_pos * s_pos,
            s_speed * s_speed,
            s_psi * s_psi,
        ))
    }

    fn observe(&self, x: &SurVec) -> Vector3<f64> {
        Vector3::new(x[0], x[1], x[2])
    }

    fn measurement_noise(&self) -> Matrix3<f64> {
        let c = &self.config;
        Matrix3::from_diagonal(&Vector3::new(
            c.position_uncertainty,
            c.position_uncertainty,
            c.speed_uncertainty,
        ))
    }

    /// A negative speed is the same motion as |v| at ψ + π; fold it so that
    /// v ≥ 0. The map flips the sign of v, so its covariance row and column
    /// change sign (the variance does not).
    fn constrain(&self, estimate: &mut Estimate<4>) {
        if estimate.state[2] < 0.0 {
            estimate.state[2] = -estimate.state[2];
            estimate.state[3] += PI;
            for i in 0..4 {
                if i != 2 {
                    estimate.cov[(i, 2)] = -estimate.cov[(i, 2)];
                    estimate.cov[(2, i)] = -estimate.cov[(2, i)];
                }
            }
        }
        estimate.state[3] = wrap_angle(estimate.state[3]);
    }
}

/// Runs the CHCV filter over one surrounding track.
#[derive(Clone, Debug)]
pub struct SurroundingStateEstimator {
    model: ChcvModel,
}

impl SurroundingStateEstimator {
    pub fn new(config: SurroundingFilterConfig) -> Self {
        Self {
            model: ChcvModel::new(config),
        }
    }

    pub fn config(&self) -> &SurroundingFilterConfig {
        &self.model.config
    }

    /// Filter one track. The output is aligned with `observations`.
    pub fn estimate(&self, observations: &[SurroundingObservation]) -> Result<Vec<SurroundingState>> {
        let times: Vec<f64> = observations.iter().map(|o| o.time).collect();
        check_time_order(&times)?;
        let dts = step_intervals(&times);

        let first = &observations[0];
        let initial = Estimate::new(
            SurVec::new(first.x, first.y, first.speed.max(0.0), 0.0),
            self.model.config.initial_uncertainty,
        );

        let states = ekf::run(&self.model, initial, observations.len(), |k| {
            let o = &observations[k];
            (
                dts[k],
                Correction {
                    z: Vector3::new(o.x, o.y, o.speed),
                    h: ChcvModel::observation_matrix(o.speed > 0.0),
                    use_residual: [true; 3],
                },
            )
        })?;

        debug!(
            vehicle = %first.target_id,
            observations = observations.len(),
            "surrounding run finished"
        );
        Ok(states.iter().map(SurroundingState::from_vector).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetId;
    use approx::assert_abs_diff_eq;
    use sensor_models::SensorDirection;

    fn straight_track(n: usize, dt: f64, v: f64, psi: f64) -> Vec<SurroundingObservation> {
        (0..n)
            .map(|k| {
                let t = k as f64 * dt;
                SurroundingObservation {
                    time: t,
                    x: 20.0 + v * psi.cos() * t,
                    y: -3.0 + v * psi.sin() * t,
                    speed: v,
                    target_id: TargetId(1),
                    direction: SensorDirection::Forward,
                }
            })
            .collect()
    }

    #[test]
    fn converges_on_constant_heading_and_speed() {
        let (v, psi) = (14.0, 0.6);
        let track = straight_track(300, 0.1, v, psi);
        let est = SurroundingStateEstimator::new(SurroundingFilterConfig::default());
        let out = est.estimate(&track).unwrap();
        assert_eq!(out.len(), track.len());

        let last = out[out.len() - 1];
        assert_abs_diff_eq!(last.v, v, epsilon = 0.2);
        assert_abs_diff_eq!(last.psi, psi, epsilon = 0.05);
        // and stays converged
        for s in &out[250..] {
            assert_abs_diff_eq!(s.psi, psi, epsilon = 0.1);
        }
    }

    #[test]
    fn converges_for_reversed_travel() {
        // Heading opposite to the initial guess of zero.
        let (v, psi) = (10.0, -2.8);
        let track = straight_track(400, 0.1, v, psi);
        let est = SurroundingStateEstimator::new(SurroundingFilterConfig::default());
        let out = est.estimate(&track).unwrap();
        let last = out[out.len() - 1];
        assert_abs_diff_eq!(last.v, v, epsilon = 0.3);
        assert_abs_diff_eq!(wrap_angle(last.psi - psi), 0.0, epsilon = 0.1);
    }

    #[test]
    fn initial_state_is_first_observation() {
        let track = straight_track(10, 0.1, 8.0, 0.4);
        let est = SurroundingStateEstimator::new(SurroundingFilterConfig::default());
        let out = est.estimate(&track).unwrap();
        assert_eq!(
            out[0],
            SurroundingState {
                x: 20.0,
                y: -3.0,
                v: 8.0,
                psi: 0.0
            }
        );
    }

    #[test]
    fn zero_speed_observation_is_prediction_only() {
        let mut track = straight_track(3, 0.1, 8.0, 0.0);
        track[1].speed = 0.0;
        track[1].x += 50.0; // would drag the state if it were used
        let est = SurroundingStateEstimator::new(SurroundingFilterConfig::default());
        let out = est.estimate(&track).unwrap();
        assert_abs_diff_eq!(out[1].x, 20.8, epsilon = 1e-9);
        assert_abs_diff_eq!(out[1].v, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn negative_speed_folds_into_heading() {
        let model = ChcvModel::new(SurroundingFilterConfig::default());
        let mut est = Estimate::new(SurVec::new(0.0, 0.0, -5.0, 0.2), 1.0);
        est.cov[(2, 3)] = 0.3;
        est.cov[(3, 2)] = 0.3;
        model.constrain(&mut est);
        assert_abs_diff_eq!(est.state[2], 5.0);
        assert_abs_diff_eq!(est.state[3], wrap_angle(0.2 + PI), epsilon = 1e-12);
        assert_abs_diff_eq!(est.cov[(2, 3)], -0.3);
        assert_abs_diff_eq!(est.cov[(2, 2)], 1.0);
    }

    #[test]
    fn outputs_respect_invariants() {
        let track = straight_track(200, 0.1, 6.0, 2.9);
        let est = SurroundingStateEstimator::new(SurroundingFilterConfig::default());
        for s in est.estimate(&track).unwrap() {
            assert!(s.v >= 0.0);
            assert!(s.psi > -PI && s.psi <= PI);
        }
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        let mut track = straight_track(5, 0.1, 6.0, 0.0);
        track[3].time = track[2].time;
        let est = SurroundingStateEstimator::new(SurroundingFilterConfig::default());
        assert!(est.estimate(&track).is_err());
    }
}
