//! Ego vehicle ground truth and its raw sensor recording.
//!
//! Truth is integrated with the CTRA equations from piecewise-constant
//! (yaw rate, acceleration) segments. The recorder turns it into the samples
//! an onboard logger would write: mph, deg/s and g with uniform noise, speed
//! dropouts as the negative sentinel and occasional missing accelerations.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use sensor_models::{
    units::{mps2_to_g, mps_to_mph},
    EgoSample,
};
use serde::{Deserialize, Serialize};
use trajectory_core::{ctra::CtraIncrement, types::wrap_angle, EgoState};

/// Controls held from `start` until the next segment begins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EgoSegment {
    pub start: f64,
    /// rad/s
    pub yaw_rate: f64,
    /// m/s²
    pub acceleration: f64,
}

/// Driving profile of the ego vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EgoProfile {
    /// m/s
    pub initial_speed: f64,
    /// Sorted by start time
    pub segments: Vec<EgoSegment>,
}

impl EgoProfile {
    pub fn cruise(speed: f64) -> Self {
        Self {
            initial_speed: speed,
            segments: Vec::new(),
        }
    }

    /// (yaw rate, acceleration) in force at `t`.
    pub fn controls_at(&self, t: f64) -> (f64, f64) {
        self.segments
            .iter()
            .filter(|s| s.start <= t)
            .last()
            .map_or((0.0, 0.0), |s| (s.yaw_rate, s.acceleration))
    }

    /// Truth at `n` samples spaced `dt` apart, starting at the origin with
    /// heading zero. Braking stops at standstill.
    pub fn integrate(&self, dt: f64, n: usize) -> Vec<EgoState> {
        let mut out = Vec::with_capacity(n);
        let (omega, acc) = self.controls_at(0.0);
        let mut state = EgoState {
            v: self.initial_speed,
            omega,
            acc,
            ..Default::default()
        };
        for k in 0..n {
            if k > 0 {
                let (omega, acc) = self.controls_at((k - 1) as f64 * dt);
                // never reverse: cut the deceleration at standstill
                let acc = if state.v + acc * dt < 0.0 { -state.v / dt } else { acc };
                let step = CtraIncrement::integrate(state.psi, state.v, omega, acc, dt);
                state = EgoState {
                    x: state.x + step.dx,
                    y: state.y + step.dy,
                    psi: wrap_angle(state.psi + omega * dt),
                    v: (state.v + acc * dt).max(0.0),
                    omega,
                    acc,
                };
            }
            out.push(state);
        }
        out
    }
}

/// Recorder noise and defects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EgoNoise {
    /// Speed noise (mph, uniform half-width)
    pub speed: f64,
    /// Yaw-rate noise (deg/s, uniform half-width)
    pub yaw_rate: f64,
    /// Acceleration noise (g, uniform half-width)
    pub acceleration: f64,
    /// Probability that an acceleration channel is missing on a sample
    pub acc_gap_probability: f64,
    /// Time intervals (inclusive) during which the speed reading is missing
    pub speed_dropouts: Vec<(f64, f64)>,
}

impl Default for EgoNoise {
    fn default() -> Self {
        Self {
            speed: 0.3,
            yaw_rate: 0.2,
            acceleration: 0.01,
            acc_gap_probability: 0.03,
            speed_dropouts: Vec::new(),
        }
    }
}

/// Turns ego truth into raw samples.
pub struct EgoRecorder {
    pub noise: EgoNoise,
    rng: ChaCha8Rng,
}

impl EgoRecorder {
    pub fn new(noise: EgoNoise, seed: u64) -> Self {
        Self {
            noise,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn uniform(&mut self, half_width: f64) -> f64 {
        self.rng.gen::<f64>() * half_width * 2.0 - half_width
    }

    fn maybe(&mut self, value: f64) -> Option<f64> {
        if self.rng.gen::<f64>() < self.noise.acc_gap_probability {
            None
        } else {
            Some(value)
        }
    }

    pub fn record(&mut self, trip_id: u64, first_sync: i64, times: &[f64], truth: &[EgoState]) -> Vec<EgoSample> {
        times
            .iter()
            .zip(truth)
            .enumerate()
            .map(|(k, (&time, s))| {
                let dropped = self
                    .noise
                    .speed_dropouts
                    .iter()
                    .any(|&(from, to)| from <= time && time <= to);
                let speed = if dropped {
                    -1.0
                } else {
                    (mps_to_mph(s.v) + self.uniform(self.noise.speed)).max(0.0)
                };
                let yaw_rate = s.omega.to_degrees() + self.uniform(self.noise.yaw_rate);
                let acc_lat = mps2_to_g(s.v * s.omega) + self.uniform(self.noise.acceleration);
                let acc_lon = mps2_to_g(s.acc) + self.uniform(self.noise.acceleration);

                EgoSample {
                    trip_id,
                    sync: first_sync + k as i64,
                    time,
                    speed,
                    yaw_rate,
                    acc_lat: self.maybe(acc_lat),
                    acc_lon: self.maybe(acc_lon),
                    speed_gps: (!dropped).then_some(mps_to_mph(s.v)),
                    heading: None,
                    brake: Some(u8::from(s.acc < -0.5)),
                    signal: None,
                }
            })
            .collect()
    }
}
