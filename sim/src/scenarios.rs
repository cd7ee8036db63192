//! Scenario definitions.
//!
//! Each scenario is a named trip: an ego driving profile, the surrounding
//! vehicles and the two onboard radars. All scenarios are deterministic
//! given the same seed.

use crate::{
    ego::{EgoNoise, EgoProfile, EgoRecorder, EgoSegment},
    radar_sim::RadarSimulator,
    replay::{GroundTruth, ScenarioLog, TargetTruth},
    target::{SimTarget, TargetMotion},
};
use sensor_models::{RadarParams, SensorDirection};
use serde::{Deserialize, Serialize};
use trajectory_core::{EventWindow, TripId, TripInput};

/// Sync counter of the first ego sample of every scenario.
pub const FIRST_SYNC: i64 = 10_000;

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Straight cruise, one vehicle ahead and one behind
    Cruise,
    /// Left-hand curve with vehicles on the same arc ahead and behind
    Curve,
    /// Brake to standstill, wait, pull away; a vehicle overtakes meanwhile
    StopAndGo,
    /// Speed missing at the start of the trip, forcing a reverse run
    LateAnchor,
    /// Multi-lane highway, several vehicles ahead and behind, annotated event
    Highway,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub trip_id: u64,
    /// Sample interval (s)
    pub dt: f64,
    /// seconds
    pub duration: f64,
    /// Ego length (m); places the radars
    pub ego_length: f64,
    pub ego: EgoProfile,
    pub ego_noise: EgoNoise,
    pub targets: Vec<SimTarget>,
    pub radars: Vec<RadarParams>,
    pub event: Option<EventWindow>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Cruise => Self::cruise(seed),
            ScenarioKind::Curve => Self::curve(seed),
            ScenarioKind::StopAndGo => Self::stop_and_go(seed),
            ScenarioKind::LateAnchor => Self::late_anchor(seed),
            ScenarioKind::Highway => Self::highway(seed),
        }
    }

    fn base(name: &str, seed: u64, duration: f64, ego: EgoProfile, targets: Vec<SimTarget>) -> Self {
        Scenario {
            name: name.into(),
            seed,
            trip_id: 1,
            dt: 0.1,
            duration,
            ego_length: 4.8,
            ego,
            ego_noise: EgoNoise::default(),
            targets,
            radars: vec![RadarParams::forward(), RadarParams::rearward()],
            event: None,
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 1: Cruise
    // -----------------------------------------------------------------------
    fn cruise(seed: u64) -> Self {
        let targets = vec![
            SimTarget::new(1, 45.0, 0.0, 26.0, 0.0, TargetMotion::ConstantVelocity),
            SimTarget::new(2, -35.0, 0.0, 24.0, 0.0, TargetMotion::ConstantVelocity),
        ];
        let mut s = Self::base("cruise", seed, 60.0, EgoProfile::cruise(25.0), targets);
        s.event = Some(EventWindow {
            start_sync: FIRST_SYNC + 200,
            end_sync: FIRST_SYNC + 300,
        });
        s
    }

    // -----------------------------------------------------------------------
    // Scenario 2: Curve
    // -----------------------------------------------------------------------
    fn curve(seed: u64) -> Self {
        let (speed, yaw_rate) = (20.0, 0.05);
        let radius = speed / yaw_rate;
        let ego = EgoProfile {
            initial_speed: speed,
            segments: vec![segment(0.0, yaw_rate, 0.0), segment(20.0, 0.0, 0.0)],
        };
        // Vehicles on the same circle, `arc` metres ahead (negative: behind).
        let on_curve = |channel: u32, arc: f64, v: f64| {
            let phi = arc / radius;
            let mut t = SimTarget::new(
                channel,
                radius * phi.sin(),
                radius * (1.0 - phi.cos()),
                v,
                phi,
                TargetMotion::ConstantTurn { omega: v / radius },
            );
            // they keep turning after the ego straightens out
            t.disappear_at = Some(20.0);
            t
        };
        let targets = vec![on_curve(1, 35.0, 20.5), on_curve(2, -25.0, 19.8)];
        Self::base("curve", seed, 40.0, ego, targets)
    }

    // -----------------------------------------------------------------------
    // Scenario 3: Stop and go
    // -----------------------------------------------------------------------
    fn stop_and_go(seed: u64) -> Self {
        let ego = EgoProfile {
            initial_speed: 15.0,
            segments: vec![
                segment(0.0, 0.0, 0.0),
                segment(5.0, 0.0, -2.5),
                segment(14.0, 0.0, 1.5),
                segment(24.0, 0.0, 0.0),
            ],
        };
        let overtaking = SimTarget::new(1, -40.0, 3.5, 17.0, 0.0, TargetMotion::ConstantVelocity);
        let mut lead = SimTarget::new(2, 60.0, 0.0, 16.0, 0.0, TargetMotion::ConstantVelocity);
        lead.disappear_at = Some(30.0);
        Self::base("stop-and-go", seed, 50.0, ego, vec![overtaking, lead])
    }

    // -----------------------------------------------------------------------
    // Scenario 4: Late anchor
    // -----------------------------------------------------------------------
    fn late_anchor(seed: u64) -> Self {
        let ego = EgoProfile {
            initial_speed: 22.0,
            segments: vec![
                segment(0.0, 0.0, 0.0),
                segment(10.0, 0.01, 0.0),
                segment(20.0, 0.0, 0.0),
            ],
        };
        let targets = vec![
            SimTarget::new(1, 40.0, 0.0, 23.0, 0.0, TargetMotion::ConstantVelocity),
            SimTarget::new(2, -30.0, 0.0, 22.5, 0.0, TargetMotion::ConstantVelocity),
        ];
        let mut s = Self::base("late-anchor", seed, 40.0, ego, targets);
        s.ego_noise.speed_dropouts = vec![(0.0, 1.0), (18.0, 18.5)];
        s
    }

    // -----------------------------------------------------------------------
    // Scenario 5: Highway
    // -----------------------------------------------------------------------
    fn highway(seed: u64) -> Self {
        let lane = 3.7;
        let targets = vec![
            SimTarget::new(1, 50.0, 0.0, 31.0, 0.0, TargetMotion::ConstantVelocity),
            SimTarget::new(2, 80.0, lane, 33.0, 0.0, TargetMotion::ConstantVelocity),
            SimTarget::new(3, 100.0, -lane, 28.0, 0.0, TargetMotion::ConstantVelocity),
            SimTarget::new(4, -40.0, 0.0, 29.5, 0.0, TargetMotion::ConstantVelocity),
            SimTarget::new(5, -70.0, lane, 32.0, 0.0, TargetMotion::ConstantVelocity),
        ];
        let mut s = Self::base("highway", seed, 60.0, EgoProfile::cruise(30.0), targets);
        s.event = Some(EventWindow {
            start_sync: FIRST_SYNC + 100,
            end_sync: FIRST_SYNC + 200,
        });
        s
    }

    /// Simulate the trip: record the ego, scan every sample with both
    /// radars and keep the ground truth.
    pub fn run(&self) -> ScenarioLog {
        let n = (self.duration / self.dt).round() as usize + 1;
        let times: Vec<f64> = (0..n).map(|k| k as f64 * self.dt).collect();
        let ego_truth = self.ego.integrate(self.dt, n);
        let ego = EgoRecorder::new(self.ego_noise.clone(), self.seed).record(
            self.trip_id,
            FIRST_SYNC,
            &times,
            &ego_truth,
        );

        let mut radar_sim = RadarSimulator::new(self.radars.clone(), self.ego_length, self.seed.wrapping_add(1));
        let mut targets = self.targets.clone();
        let mut target_truth: Vec<TargetTruth> = targets
            .iter()
            .map(|t| TargetTruth {
                channel: t.channel,
                states: Vec::with_capacity(n),
            })
            .collect();
        let (mut forward, mut rearward) = (Vec::new(), Vec::new());

        for (&time, pose) in times.iter().zip(&ego_truth) {
            for (direction, ret) in radar_sim.scan(time, pose, &targets) {
                match direction {
                    SensorDirection::Forward => forward.push(ret),
                    SensorDirection::Rearward => rearward.push(ret),
                }
            }
            for (truth, target) in target_truth.iter_mut().zip(&mut targets) {
                truth.states.push(target.state);
                target.step(self.dt);
            }
        }

        ScenarioLog {
            scenario_name: self.name.clone(),
            seed: self.seed,
            dt: self.dt,
            trip: TripInput {
                trip_id: TripId(self.trip_id),
                ego_length: Some(self.ego_length),
                ego,
                forward,
                rearward,
                event: self.event,
            },
            truth: GroundTruth {
                times,
                ego: ego_truth,
                targets: target_truth,
            },
        }
    }
}

fn segment(start: f64, yaw_rate: f64, acceleration: f64) -> EgoSegment {
    EgoSegment {
        start,
        yaw_rate,
        acceleration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_log() {
        let a = Scenario::build(ScenarioKind::Highway, 42).run();
        let b = Scenario::build(ScenarioKind::Highway, 42).run();
        assert_eq!(a, b);
        let c = Scenario::build(ScenarioKind::Highway, 43).run();
        assert_ne!(a.trip.ego, c.trip.ego);
    }

    #[test]
    fn log_is_aligned_and_ordered() {
        let log = Scenario::build(ScenarioKind::Cruise, 1).run();
        assert_eq!(log.trip.ego.len(), 601);
        assert_eq!(log.truth.times.len(), 601);
        assert_eq!(log.truth.targets.len(), 2);
        assert!(log.truth.targets.iter().all(|t| t.states.len() == 601));
        assert!(log.trip.ego.windows(2).all(|w| w[0].time < w[1].time));
        assert_eq!(log.trip.ego[0].sync, FIRST_SYNC);
        // lead is seen ahead, follower behind
        assert!(log.trip.forward.iter().all(|r| r.channel == 1));
        assert!(log.trip.rearward.iter().all(|r| r.channel == 2));
        assert!(log.trip.forward.len() > 500);
    }

    #[test]
    fn late_anchor_starts_without_speed() {
        let log = Scenario::build(ScenarioKind::LateAnchor, 1).run();
        assert!(log.trip.ego[..10].iter().all(|s| !s.has_speed()));
        assert!(log.trip.ego[log.trip.ego.len() - 5..].iter().all(|s| s.has_speed()));
    }

    #[test]
    fn every_kind_builds() {
        for kind in [
            ScenarioKind::Cruise,
            ScenarioKind::Curve,
            ScenarioKind::StopAndGo,
            ScenarioKind::LateAnchor,
            ScenarioKind::Highway,
        ] {
            let log = Scenario::build(kind, 9).run();
            assert!(!log.trip.ego.is_empty());
            assert!(!log.trip.forward.is_empty() || !log.trip.rearward.is_empty());
        }
    }
}
