//! Ego vehicle estimator: Constant Turn Rate and Acceleration (CTRA) EKF.
//!
//! ## State vector
//! x = [px, py, ψ, v, ω, a]ᵀ
//!
//! ## Motion model
//! Position integrates (v + a·t) along the heading ψ + ω·t over the step:
//!
//! Δx = ((v + a·dt)·sin ψ₁ − v·sin ψ₀)/ω + a·(cos ψ₁ − cos ψ₀)/ω²
//! Δy = (v·cos ψ₀ − (v + a·dt)·cos ψ₁)/ω + a·(sin ψ₁ − sin ψ₀)/ω²
//!
//! with ψ₁ = ψ₀ + ω·dt; ψ += ω·dt, v += a·dt, ω and a are random walks.
//! For |ω| below [`SERIES_YAW_RATE`] the same integrals are evaluated from
//! their second-order expansion in ω, which is the exact limit of the closed
//! form and free of the 1/ω³ cancellation.
//!
//! ## Measurement
//! z = [v, ω, a]ᵀ. The acceleration row is only active while the
//! accelerometer reports a non-zero horizontal acceleration.

use crate::{
    config::EgoFilterConfig,
    ekf::{self, Correction, Estimate, MotionModel},
    error::Result,
    preprocess::{step_intervals, EgoChannels},
    types::{wrap_angle, EgoCov, EgoState, EgoVec, RunDirection},
};
use nalgebra::{Matrix3, SMatrix, Vector3};
use sensor_models::EgoSample;
use tracing::debug;

/// Below this yaw rate (rad/s) the motion model switches to the series form.
pub const SERIES_YAW_RATE: f64 = 1e-3;

// ---------------------------------------------------------------------------
// CTRA integration
// ---------------------------------------------------------------------------

/// Position increment over one step and its partial derivatives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CtraIncrement {
    pub dx: f64,
    pub dy: f64,
    pub dx_dv: f64,
    pub dy_dv: f64,
    pub dx_domega: f64,
    pub dy_domega: f64,
    pub dx_dacc: f64,
    pub dy_dacc: f64,
}

impl CtraIncrement {
    /// Integrate the CTRA position equations from heading `psi` with speed
    /// `v`, yaw rate `omega` and acceleration `acc` over `dt` seconds.
    pub fn integrate(psi: f64, v: f64, omega: f64, acc: f64, dt: f64) -> Self {
        if omega.abs() < SERIES_YAW_RATE {
            Self::series(psi, v, omega, acc, dt)
        } else {
            Self::closed_form(psi, v, omega, acc, dt)
        }
    }

    fn closed_form(psi: f64, v: f64, w: f64, a: f64, dt: f64) -> Self {
        let (s0, c0) = psi.sin_cos();
        let (s1, c1) = (psi + w * dt).sin_cos();
        let w2 = w * w;
        let w3 = w2 * w;
        let v1 = v + a * dt;

        let ax = v1 * s1 - v * s0;
        let ay = v * c0 - v1 * c1;
        let bx = c1 - c0;
        let by = s1 - s0;

        Self {
            dx: ax / w + a * bx / w2,
            dy: ay / w + a * by / w2,
            dx_dv: by / w,
            dy_dv: -bx / w,
            dx_domega: v1 * dt * c1 / w - ax / w2 - a * dt * s1 / w2 - 2.0 * a * bx / w3,
            dy_domega: v1 * dt * s1 / w - ay / w2 + a * dt * c1 / w2 - 2.0 * a * by / w3,
            dx_dacc: dt * s1 / w + bx / w2,
            dy_dacc: -dt * c1 / w + by / w2,
        }
    }

    fn series(psi: f64, v: f64, w: f64, a: f64, dt: f64) -> Self {
        let (s0, c0) = psi.sin_cos();
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt3 * dt;
        // ∫ (v + a·t)·tᵏ dt over [0, dt]
        let m1 = v * dt + a * dt2 / 2.0;
        let m2 = v * dt2 / 2.0 + a * dt3 / 3.0;
        let m3 = v * dt3 / 3.0 + a * dt4 / 4.0;
        let hw2 = w * w / 2.0;

        Self {
            dx: c0 * m1 - w * s0 * m2 - hw2 * c0 * m3,
            dy: s0 * m1 + w * c0 * m2 - hw2 * s0 * m3,
            dx_dv: c0 * dt - w * s0 * dt2 / 2.0 - hw2 * c0 * dt3 / 3.0,
            dy_dv: s0 * dt + w * c0 * dt2 / 2.0 - hw2 * s0 * dt3 / 3.0,
            dx_domega: -s0 * m2 - w * c0 * m3,
            dy_domega: c0 * m2 - w * s0 * m3,
            dx_dacc: c0 * dt2 / 2.0 - w * s0 * dt3 / 3.0 - hw2 * c0 * dt4 / 4.0,
            dy_dacc: s0 * dt2 / 2.0 + w * c0 * dt3 / 3.0 - hw2 * s0 * dt4 / 4.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// CTRA motion model with [v, ω, a] observation.
#[derive(Clone, Debug)]
pub struct CtraModel {
    pub config: EgoFilterConfig,
}

impl CtraModel {
    pub fn new(config: EgoFilterConfig) -> Self {
        Self { config }
    }

    /// Observation Jacobian; the acceleration row is zero unless `acc_active`.
    pub fn observation_matrix(acc_active: bool) -> SMatrix<f64, 3, 6> {
        let mut h = SMatrix::<f64, 3, 6>::zeros();
        h[(0, 3)] = 1.0;
        h[(1, 4)] = 1.0;
        if acc_active {
            h[(2, 5)] = 1.0;
        }
        h
    }
}

impl MotionModel<6> for CtraModel {
    fn propagate(&self, x: &EgoVec, dt: f64) -> EgoVec {
        let inc = CtraIncrement::integrate(x[2], x[3], x[4], x[5], dt);
        EgoVec::new(
            x[0] + inc.dx,
            x[1] + inc.dy,
            wrap_angle(x[2] + x[4] * dt),
            x[3] + x[5] * dt,
            x[4],
            x[5],
        )
    }

    fn jacobian(&self, x: &EgoVec, dt: f64) -> EgoCov {
        let inc = CtraIncrement::integrate(x[2], x[3], x[4], x[5], dt);
        #[rustfmt::skip]
        let f = EgoCov::new(
            1.0, 0.0, -inc.dy, inc.dx_dv, inc.dx_domega, inc.dx_dacc,
            0.0, 1.0,  inc.dx, inc.dy_dv, inc.dy_domega, inc.dy_dacc,
            0.0, 0.0,  1.0,    0.0,       dt,            0.0,
            0.0, 0.0,  0.0,    1.0,       0.0,           dt,
            0.0, 0.0,  0.0,    0.0,       1.0,           0.0,
            0.0, 0.0,  0.0,    0.0,       0.0,           1.0,
        );
        f
    }

    fn process_noise(&self, dt: f64) -> EgoCov {
        let c = &self.config;
        let s_pos = 0.5 * c.max_acceleration * dt * dt;
        let s_psi = c.max_yaw_rate * dt;
        let s_speed = c.max_acceleration * dt;
        let s_omega = c.max_yaw_acceleration * dt;
        let s_acc = c.max_jerk * dt;
        EgoCov::from_diagonal(&EgoVec::new(
            s_pos * s_pos,
            s_pos * s_pos,
            s_psi * s_psi,
            s_speed * s_speed,
            s_omega * s_omega,
            s_acc * s_acc,
        ))
    }

    fn observe(&self, x: &EgoVec) -> Vector3<f64> {
        Vector3::new(x[3], x[4], x[5])
    }

    fn measurement_noise(&self) -> Matrix3<f64> {
        let c = &self.config;
        Matrix3::from_diagonal(&Vector3::new(
            c.speed_uncertainty,
            c.yaw_rate_uncertainty,
            c.acceleration_uncertainty,
        ))
    }

    fn constrain(&self, estimate: &mut Estimate<6>) {
        if estimate.state[3] < 0.0 {
            estimate.state[3] = 0.0;
        }
        estimate.state[2] = wrap_angle(estimate.state[2]);
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Runs the CTRA filter over one trip's ego samples.
#[derive(Clone, Debug)]
pub struct EgoStateEstimator {
    model: CtraModel,
}

impl EgoStateEstimator {
    pub fn new(config: EgoFilterConfig) -> Self {
        Self {
            model: CtraModel::new(config),
        }
    }

    pub fn config(&self) -> &EgoFilterConfig {
        &self.model.config
    }

    /// Filter `samples` (ascending time) in the given direction. The output is
    /// aligned with `samples`, whatever the direction.
    pub fn estimate(&self, samples: &[EgoSample], direction: RunDirection) -> Result<Vec<EgoState>> {
        let mut channels = EgoChannels::from_samples(samples)?;
        if direction == RunDirection::Reverse {
            channels.reverse();
        }
        let mut states = self.estimate_channels(&channels)?;
        if direction == RunDirection::Reverse {
            states.reverse();
        }
        debug!(
            trip = samples[0].trip_id,
            %direction,
            samples = samples.len(),
            "ego run finished"
        );
        Ok(states)
    }

    /// Filter prepared channels in the order they are stored.
    pub fn estimate_channels(&self, ch: &EgoChannels) -> Result<Vec<EgoState>> {
        let n = ch.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let dts = step_intervals(&ch.time);

        let initial = Estimate::new(
            EgoVec::new(0.0, 0.0, 0.0, ch.speed[0].max(0.0), ch.yaw_rate[0], ch.acc_lon[0]),
            self.model.config.initial_uncertainty,
        );

        let states = ekf::run(&self.model, initial, n, |k| {
            let z = Vector3::new(ch.speed[k], ch.yaw_rate[k], ch.acc_lon[k]);
            let h = CtraModel::observation_matrix(ch.acc_square(k) > 0.0);
            (
                dts[k],
                Correction {
                    z,
                    h,
                    use_residual: [!speed_unreliable(ch, k), true, true],
                },
            )
        })?;

        Ok(states.iter().map(EgoState::from_vector).collect())
    }
}

/// The speed reading at `k` is missing, or reads zero while the vehicle was
/// accelerating around the previous sample.
fn speed_unreliable(ch: &EgoChannels, k: usize) -> bool {
    let v = ch.speed[k];
    v < 0.0 || (v <= 0.0 && ch.mean_acc_lon_around(k - 1) > 0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::MIN_YAW_RATE;
    use approx::assert_abs_diff_eq;
    use sensor_models::units::{mps2_to_g, mps_to_mph};
    use std::f64::consts::PI;

    fn ego_sample(k: usize, dt: f64, speed_mps: f64, yaw_rate_rad: f64, acc: f64) -> EgoSample {
        EgoSample {
            trip_id: 1,
            sync: k as i64,
            time: k as f64 * dt,
            speed: mps_to_mph(speed_mps),
            yaw_rate: yaw_rate_rad.to_degrees(),
            acc_lat: Some(0.0),
            acc_lon: Some(mps2_to_g(acc)),
            speed_gps: None,
            heading: None,
            brake: None,
            signal: None,
        }
    }

    /// Central finite difference of the propagated state w.r.t. state `j`.
    fn numeric_jacobian(model: &CtraModel, x: &EgoVec, dt: f64) -> EgoCov {
        let mut f = EgoCov::zeros();
        let eps = 1e-6;
        for j in 0..6 {
            let mut xp = *x;
            let mut xm = *x;
            xp[j] += eps;
            xm[j] -= eps;
            let fp = model.propagate(&xp, dt);
            let fm = model.propagate(&xm, dt);
            for i in 0..6 {
                let mut d = fp[i] - fm[i];
                if i == 2 {
                    d = wrap_angle(d);
                }
                f[(i, j)] = d / (2.0 * eps);
            }
        }
        f
    }

    #[test]
    fn analytic_jacobian_matches_finite_difference() {
        let model = CtraModel::new(EgoFilterConfig::default());
        for &(psi, v, w, a) in &[
            (0.3, 12.0, 0.2, 1.0),
            (-2.0, 5.0, -0.4, -2.0),
            (1.0, 20.0, 2e-4, 0.5),
            (3.0, 8.0, -5e-4, 0.0),
        ] {
            let x = EgoVec::new(3.0, -4.0, psi, v, w, a);
            let analytic = model.jacobian(&x, 0.1);
            let numeric = numeric_jacobian(&model, &x, 0.1);
            for i in 0..6 {
                for j in 0..6 {
                    assert_abs_diff_eq!(analytic[(i, j)], numeric[(i, j)], epsilon = 1e-5);
                }
            }
        }
    }

    #[test]
    fn series_agrees_with_closed_form_at_threshold() {
        let w = SERIES_YAW_RATE * 1.5;
        let closed = CtraIncrement::closed_form(0.7, 15.0, w, 1.2, 0.1);
        let series = CtraIncrement::series(0.7, 15.0, w, 1.2, 0.1);
        assert_abs_diff_eq!(closed.dx, series.dx, epsilon = 1e-9);
        assert_abs_diff_eq!(closed.dy, series.dy, epsilon = 1e-9);
        assert_abs_diff_eq!(closed.dx_domega, series.dx_domega, epsilon = 1e-6);
        assert_abs_diff_eq!(closed.dy_dacc, series.dy_dacc, epsilon = 1e-9);
    }

    #[test]
    fn quarter_turn_lands_on_circle() {
        // Constant speed, ω·T = π/2: end at (R, R) with R = v/ω.
        let (v, w) = (10.0, 0.5);
        let inc = CtraIncrement::integrate(0.0, v, w, 0.0, PI / 2.0 / w);
        assert_abs_diff_eq!(inc.dx, v / w, epsilon = 1e-9);
        assert_abs_diff_eq!(inc.dy, v / w, epsilon = 1e-9);
    }

    #[test]
    fn process_noise_scales_with_limits() {
        let model = CtraModel::new(EgoFilterConfig::default());
        let q = model.process_noise(0.1);
        let c = EgoFilterConfig::default();
        assert_abs_diff_eq!(q[(0, 0)], (0.5 * c.max_acceleration * 0.01).powi(2), epsilon = 1e-15);
        assert_abs_diff_eq!(q[(2, 2)], (c.max_yaw_rate * 0.1).powi(2), epsilon = 1e-15);
        assert_abs_diff_eq!(q[(5, 5)], (c.max_jerk * 0.1).powi(2), epsilon = 1e-12);
        assert_eq!(q[(0, 1)], 0.0);
    }

    #[test]
    fn straight_line_at_constant_speed() {
        let v0 = 15.0;
        let dt = 0.1;
        let samples: Vec<_> = (0..200).map(|k| ego_sample(k, dt, v0, 0.0, 0.0)).collect();
        let est = EgoStateEstimator::new(EgoFilterConfig::default());
        let out = est.estimate(&samples, RunDirection::Forward).unwrap();

        assert_eq!(out.len(), samples.len());
        for (k, s) in out.iter().enumerate() {
            let t = k as f64 * dt;
            assert_abs_diff_eq!(s.v, v0, epsilon = 1e-6);
            assert_abs_diff_eq!(s.x, v0 * t, epsilon = 1e-3);
            // ω is floored at 1e-6, so the path bends by v·ω·t²/2 at most
            assert_abs_diff_eq!(s.y, 0.0, epsilon = 1e-2);
            assert_abs_diff_eq!(s.psi, 0.0, epsilon = 1e-4);
            assert_abs_diff_eq!(s.omega, MIN_YAW_RATE, epsilon = 1e-9);
        }
    }

    #[test]
    fn reverse_run_is_aligned_and_anchored_at_the_end() {
        let v0 = 10.0;
        let samples: Vec<_> = (0..50).map(|k| ego_sample(k, 0.1, v0, 0.0, 0.0)).collect();
        let est = EgoStateEstimator::new(EgoFilterConfig::default());
        let out = est.estimate(&samples, RunDirection::Reverse).unwrap();
        let last = out[out.len() - 1];
        assert_abs_diff_eq!(last.x, 0.0);
        // Going back in time along +x heading ends up behind the anchor
        assert_abs_diff_eq!(out[0].x, -v0 * 4.9, epsilon = 1e-3);
        assert!(out.iter().all(|s| (s.v - v0).abs() < 1e-6));
    }

    #[test]
    fn speed_never_negative_and_heading_wrapped() {
        // Hard braking with noisy speed, sweeping turn past ±π.
        let dt = 0.1;
        let samples: Vec<_> = (0..300)
            .map(|k| {
                let v = (8.0 - 0.5 * k as f64 * dt).max(0.0);
                let jitter = if k % 2 == 0 { 0.3 } else { -0.3 };
                let mut s = ego_sample(k, dt, (v + jitter).max(0.0), 0.6, -0.5);
                if k % 17 == 0 {
                    s.speed = -1.0;
                }
                s
            })
            .collect();
        let est = EgoStateEstimator::new(EgoFilterConfig::default());
        let out = est.estimate(&samples, RunDirection::Forward).unwrap();
        for s in &out {
            assert!(s.v >= 0.0);
            assert!(s.psi > -PI && s.psi <= PI);
        }
    }

    #[test]
    fn missing_speed_relies_on_prediction() {
        let dt = 0.1;
        let mut samples: Vec<_> = (0..40).map(|k| ego_sample(k, dt, 12.0, 0.0, 0.0)).collect();
        samples[20].speed = -1.0;
        let est = EgoStateEstimator::new(EgoFilterConfig::default());
        let out = est.estimate(&samples, RunDirection::Forward).unwrap();
        assert_abs_diff_eq!(out[20].v, 12.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_speed_while_accelerating_is_ignored() {
        let dt = 0.1;
        let acc = 1.0;
        let mut samples: Vec<_> = (0..30)
            .map(|k| ego_sample(k, dt, 5.0 + acc * k as f64 * dt, 0.0, acc))
            .collect();
        samples[15].speed = 0.0;
        let est = EgoStateEstimator::new(EgoFilterConfig::default());
        let out = est.estimate(&samples, RunDirection::Forward).unwrap();
        let expected = 5.0 + acc * 1.5;
        assert!((out[15].v - expected).abs() < 0.2, "v = {}", out[15].v);
    }

    /// Speed ramps at 1 m/s² while the acceleration channels read zero
    /// after the first sample; `acc_lat` sets the trigger.
    fn ramp_with_zero_acc(acc_lat_g: f64) -> Vec<EgoSample> {
        let dt = 0.1;
        (0..50)
            .map(|k| {
                let mut s = ego_sample(k, dt, 8.0 + k as f64 * dt, 0.0, 1.0);
                if k > 0 {
                    s.acc_lat = Some(acc_lat_g);
                    s.acc_lon = Some(0.0);
                }
                s
            })
            .collect()
    }

    #[test]
    fn silent_acceleration_channels_leave_acc_alone() {
        let est = EgoStateEstimator::new(EgoFilterConfig::default());
        let out = est.estimate(&ramp_with_zero_acc(0.0), RunDirection::Forward).unwrap();
        assert_abs_diff_eq!(out[0].acc, 1.0, epsilon = 1e-9);
        for s in &out {
            assert_abs_diff_eq!(s.acc, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn active_acceleration_channel_corrects_acc() {
        let est = EgoStateEstimator::new(EgoFilterConfig::default());
        let out = est.estimate(&ramp_with_zero_acc(0.05), RunDirection::Forward).unwrap();
        let last = out[out.len() - 1];
        assert!(last.acc < 0.5, "acc = {}", last.acc);
    }

    #[test]
    fn single_sample_is_the_initial_state() {
        let samples = vec![ego_sample(0, 0.1, 7.0, 0.0, 0.0)];
        let est = EgoStateEstimator::new(EgoFilterConfig::default());
        let out = est.estimate(&samples, RunDirection::Forward).unwrap();
        assert_eq!(out.len(), 1);
        assert_abs_diff_eq!(out[0].v, 7.0, epsilon = 1e-9);
        assert_eq!((out[0].x, out[0].y, out[0].psi), (0.0, 0.0, 0.0));
    }

    #[test]
    fn rejects_unordered_time() {
        let mut samples: Vec<_> = (0..5).map(|k| ego_sample(k, 0.1, 7.0, 0.0, 0.0)).collect();
        samples.swap(2, 3);
        let est = EgoStateEstimator::new(EgoFilterConfig::default());
        assert!(est.estimate(&samples, RunDirection::Forward).is_err());
        assert!(est.estimate(&[], RunDirection::Forward).is_err());
    }
}
