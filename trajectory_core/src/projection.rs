//! Radar-to-world projection of surrounding-vehicle returns.
//!
//! A return is measured from the radar on the nose (forward) or the tail
//! (rearward) of the ego vehicle. Its body-frame polar angle is the sensor
//! azimuth subtracted from the boresight angle; the body frame has x to the
//! right and y along the heading. The world rotation of a body vector
//! (dx, dy) under heading ψ is
//!
//! ```text
//! X = sin ψ·dx + cos ψ·dy
//! Y = −cos ψ·dx + sin ψ·dy
//! ```
//!
//! Only returns whose timestamp exactly matches an ego sample are projected.

use crate::{
    config::ProjectionConfig,
    types::{EgoState, SurroundingObservation, TargetId},
};
use sensor_models::{units::m_to_ft, RadarReturn, SensorDirection};

/// Rotate a body-frame vector into the world frame.
pub fn rotate_to_world(psi: f64, dx: f64, dy: f64) -> (f64, f64) {
    let (s, c) = psi.sin_cos();
    (s * dx + c * dy, -c * dx + s * dy)
}

/// Inverse of [`rotate_to_world`].
pub fn rotate_to_body(psi: f64, wx: f64, wy: f64) -> (f64, f64) {
    let (s, c) = psi.sin_cos();
    (s * wx - c * wy, c * wx + s * wy)
}

/// The selected ego run, indexed by sample time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EgoTrajectory {
    times: Vec<f64>,
    states: Vec<EgoState>,
}

impl EgoTrajectory {
    /// `times` ascending and aligned with `states`; extra entries of the
    /// longer vector are ignored.
    pub fn new(mut times: Vec<f64>, mut states: Vec<EgoState>) -> Self {
        let n = times.len().min(states.len());
        times.truncate(n);
        states.truncate(n);
        Self { times, states }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[EgoState] {
        &self.states
    }

    /// Ego pose at exactly `time`, if there is a sample there.
    pub fn pose_at(&self, time: f64) -> Option<&EgoState> {
        self.times
            .binary_search_by(|t| t.total_cmp(&time))
            .ok()
            .map(|i| &self.states[i])
    }
}

/// Converts polar radar returns into world-frame observations.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateProjector {
    /// Ego vehicle length (m); the radars sit at ± half of it
    pub ego_length: f64,
    pub min_track_observations: usize,
}

impl CoordinateProjector {
    pub fn new(ego_length: f64, min_track_observations: usize) -> Self {
        Self {
            ego_length,
            min_track_observations,
        }
    }

    /// Projector for one trip; `ego_length` falls back to the configured default.
    pub fn for_trip(config: &ProjectionConfig, ego_length: Option<f64>) -> Self {
        Self::new(
            ego_length.unwrap_or(config.default_ego_length),
            config.min_track_observations,
        )
    }

    /// World position of the radar mount: the nose or the tail.
    pub fn reference_point(&self, ego: &EgoState, direction: SensorDirection) -> (f64, f64) {
        let half = direction.mount_sign() * self.ego_length / 2.0;
        let (c, s) = ego.heading_unit();
        (ego.x + half * c, ego.y + half * s)
    }

    /// Project one return seen from `ego`.
    pub fn project_return(
        &self,
        ego: &EgoState,
        ret: &RadarReturn,
        direction: SensorDirection,
        target_id: TargetId,
    ) -> SurroundingObservation {
        let (s, c) = direction.body_angle(ret.azimuth).sin_cos();
        let range = ret.range_m();
        let range_rate = ret.range_rate_mps();

        let (rx, ry) = self.reference_point(ego, direction);
        let (dx, dy) = rotate_to_world(ego.psi, range * c, range * s);
        let (rvx, rvy) = rotate_to_world(ego.psi, range_rate * c, range_rate * s);
        let (evx, evy) = ego.velocity();

        SurroundingObservation {
            time: ret.time,
            x: rx + dx,
            y: ry + dy,
            speed: (evx + rvx).hypot(evy + rvy),
            target_id,
            direction,
        }
    }

    /// Project every usable return of one target. Returns with negative
    /// range or without an ego sample at the same time are dropped, repeated
    /// timestamps keep the first return. `None` when fewer than
    /// `min_track_observations` remain.
    pub fn project_track(
        &self,
        trajectory: &EgoTrajectory,
        returns: &[RadarReturn],
        direction: SensorDirection,
        target_id: TargetId,
    ) -> Option<Vec<SurroundingObservation>> {
        let mut observations: Vec<SurroundingObservation> = returns
            .iter()
            .filter(|r| r.has_range())
            .filter_map(|r| {
                trajectory
                    .pose_at(r.time)
                    .map(|ego| self.project_return(ego, r, direction, target_id))
            })
            .collect();

        observations.sort_by(|a, b| a.time.total_cmp(&b.time));
        observations.dedup_by(|b, a| a.time == b.time);

        if observations.len() < self.min_track_observations {
            return None;
        }
        Some(observations)
    }

    /// The return a radar would report for a target at world position
    /// `(x, y)` moving with world velocity `(vx, vy)`. Range-rate is the
    /// relative velocity along the line of sight.
    pub fn synthesize_return(
        &self,
        ego: &EgoState,
        time: f64,
        target: (f64, f64, f64, f64),
        direction: SensorDirection,
        channel: u32,
    ) -> RadarReturn {
        let (x, y, vx, vy) = target;
        let (rx, ry) = self.reference_point(ego, direction);
        let (dx, dy) = (x - rx, y - ry);
        let range = dx.hypot(dy);

        let (bx, by) = rotate_to_body(ego.psi, dx, dy);
        let azimuth = direction.sensor_azimuth(by.atan2(bx));

        let (evx, evy) = ego.velocity();
        let range_rate = if range > 0.0 {
            ((vx - evx) * dx + (vy - evy) * dy) / range
        } else {
            0.0
        };

        RadarReturn {
            time,
            range: m_to_ft(range),
            range_rate: m_to_ft(range_rate),
            azimuth,
            channel,
        }
    }
}

impl Default for CoordinateProjector {
    fn default() -> Self {
        Self::for_trip(&ProjectionConfig::default(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chcv::SurroundingStateEstimator, config::SurroundingFilterConfig};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn ego_at(x: f64, y: f64, psi: f64, v: f64) -> EgoState {
        EgoState {
            x,
            y,
            psi,
            v,
            ..Default::default()
        }
    }

    #[test]
    fn rotation_round_trips() {
        for psi in [-2.5, -0.3, 0.0, 0.7, 3.0] {
            let (wx, wy) = rotate_to_world(psi, 1.5, -4.0);
            let (bx, by) = rotate_to_body(psi, wx, wy);
            assert_abs_diff_eq!(bx, 1.5, epsilon = 1e-12);
            assert_abs_diff_eq!(by, -4.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn boresight_return_lies_on_heading_axis() {
        let p = CoordinateProjector::new(4.0, 10);
        let ego = ego_at(10.0, 5.0, 0.0, 0.0);
        let ret = RadarReturn {
            time: 0.0,
            range: m_to_ft(20.0),
            range_rate: 0.0,
            azimuth: 0.0,
            channel: 1,
        };
        let fwd = p.project_return(&ego, &ret, SensorDirection::Forward, TargetId(1));
        assert_abs_diff_eq!(fwd.x, 10.0 + 2.0 + 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fwd.y, 5.0, epsilon = 1e-9);

        let rear = p.project_return(&ego, &ret, SensorDirection::Rearward, TargetId(1));
        assert_abs_diff_eq!(rear.x, 10.0 - 2.0 - 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rear.y, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn positive_azimuth_is_to_the_right() {
        let p = CoordinateProjector::new(0.0, 10);
        let ego = ego_at(0.0, 0.0, FRAC_PI_2, 0.0); // heading +y, right is +x
        let ret = RadarReturn {
            time: 0.0,
            range: m_to_ft(10.0),
            range_rate: 0.0,
            azimuth: 0.2,
            channel: 1,
        };
        let obs = p.project_return(&ego, &ret, SensorDirection::Forward, TargetId(1));
        assert!(obs.x > 0.0);
        assert!(obs.y > 0.0);
    }

    #[test]
    fn speed_adds_range_rate_to_ego_velocity() {
        let p = CoordinateProjector::new(4.5, 10);
        let ego = ego_at(0.0, 0.0, 0.4, 20.0);
        // closing at 5 m/s dead ahead: target does 15 m/s
        let ret = RadarReturn {
            time: 0.0,
            range: m_to_ft(30.0),
            range_rate: m_to_ft(-5.0),
            azimuth: 0.0,
            channel: 1,
        };
        let obs = p.project_return(&ego, &ret, SensorDirection::Forward, TargetId(1));
        assert_abs_diff_eq!(obs.speed, 15.0, epsilon = 1e-9);
    }

    #[test]
    fn synthesized_return_projects_back() {
        let p = CoordinateProjector::new(4.5, 10);
        let ego = ego_at(3.0, -7.0, 2.2, 12.0);
        for direction in [SensorDirection::Forward, SensorDirection::Rearward] {
            let target = (
                3.0 + 25.0 * (2.2f64 + 0.1 * direction.mount_sign()).cos() * direction.mount_sign(),
                -7.0 + 25.0 * (2.2f64 + 0.1 * direction.mount_sign()).sin() * direction.mount_sign(),
                1.0,
                2.0,
            );
            let ret = p.synthesize_return(&ego, 0.0, target, direction, 3);
            assert!(ret.azimuth.abs() < PI / 4.0);
            let obs = p.project_return(&ego, &ret, direction, TargetId(3));
            assert_abs_diff_eq!(obs.x, target.0, epsilon = 1e-9);
            assert_abs_diff_eq!(obs.y, target.1, epsilon = 1e-9);
        }
    }

    fn trajectory(n: usize, dt: f64, v: f64) -> EgoTrajectory {
        heading_trajectory(n, dt, v, 0.0)
    }

    /// Straight drive from the origin at heading `psi`.
    fn heading_trajectory(n: usize, dt: f64, v: f64, psi: f64) -> EgoTrajectory {
        let times: Vec<f64> = (0..n).map(|k| k as f64 * dt).collect();
        let states = times
            .iter()
            .map(|&t| ego_at(v * t * psi.cos(), v * t * psi.sin(), psi, v))
            .collect();
        EgoTrajectory::new(times, states)
    }

    /// Target ahead on the ego's axis, driving along the line of sight.
    fn lead_vehicle_returns(traj: &EgoTrajectory, p: &CoordinateProjector, v: f64) -> Vec<RadarReturn> {
        traj.times()
            .iter()
            .zip(traj.states())
            .map(|(&t, ego)| {
                let (c, s) = ego.heading_unit();
                let gap = 40.0 + (v - ego.v) * t;
                let target = (ego.x + gap * c, ego.y + gap * s, v * c, v * s);
                p.synthesize_return(ego, t, target, SensorDirection::Forward, 9)
            })
            .collect()
    }

    #[test]
    fn track_needs_minimum_observations() {
        let p = CoordinateProjector::new(4.5, 10);
        let traj = trajectory(10, 0.1, 15.0);
        let returns = lead_vehicle_returns(&traj, &p, 18.0);

        assert!(p
            .project_track(&traj, &returns[..9], SensorDirection::Forward, TargetId(1))
            .is_none());
        let obs = p
            .project_track(&traj, &returns, SensorDirection::Forward, TargetId(1))
            .unwrap();
        assert_eq!(obs.len(), 10);
    }

    #[test]
    fn unmatched_and_empty_returns_are_dropped() {
        let p = CoordinateProjector::new(4.5, 1);
        let traj = trajectory(5, 0.1, 15.0);
        let mut returns = lead_vehicle_returns(&traj, &p, 18.0);
        returns[1].range = -1.0;
        returns[2].time += 0.05;
        returns.push(returns[4].clone());
        let obs = p
            .project_track(&traj, &returns, SensorDirection::Forward, TargetId(1))
            .unwrap();
        let times: Vec<f64> = obs.iter().map(|o| o.time).collect();
        assert_eq!(times, vec![0.0, traj.times()[3], traj.times()[4]]);
    }

    #[test]
    fn projected_track_filters_back_to_target_state() {
        // heading differs from the filter's initial guess of zero
        let psi = 0.3;
        let p = CoordinateProjector::new(4.5, 10);
        let traj = heading_trajectory(300, 0.1, 15.0, psi);
        let v_target = 18.0;
        let returns = lead_vehicle_returns(&traj, &p, v_target);
        let obs = p
            .project_track(&traj, &returns, SensorDirection::Forward, TargetId(1))
            .unwrap();
        assert_eq!(obs.len(), 300);

        let along = |t: f64| 40.0 + v_target * t;
        for (o, &t) in obs.iter().zip(traj.times()) {
            assert_abs_diff_eq!(o.x, along(t) * psi.cos(), epsilon = 1e-6);
            assert_abs_diff_eq!(o.y, along(t) * psi.sin(), epsilon = 1e-6);
            assert_abs_diff_eq!(o.speed, v_target, epsilon = 1e-6);
        }

        let states = SurroundingStateEstimator::new(SurroundingFilterConfig::default())
            .estimate(&obs)
            .unwrap();
        assert_eq!(states[0].psi, 0.0);
        let last = states[states.len() - 1];
        assert_abs_diff_eq!(last.v, v_target, epsilon = 0.2);
        assert_abs_diff_eq!(last.psi, psi, epsilon = 0.05);
        assert_abs_diff_eq!(last.x, along(29.9) * psi.cos(), epsilon = 1.0);
        assert_abs_diff_eq!(last.y, along(29.9) * psi.sin(), epsilon = 1.0);
    }

    #[test]
    fn pose_lookup_is_exact() {
        let traj = trajectory(4, 0.5, 2.0);
        assert!(traj.pose_at(0.5).is_some());
        assert!(traj.pose_at(0.5000001).is_none());
        assert!(traj.pose_at(-1.0).is_none());
    }
}
