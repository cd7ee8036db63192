//! Onboard radar: raw returns, mounting direction, sensor parameters.

use crate::units::ft_to_m;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Which of the two radars produced a return.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorDirection {
    /// Mounted on the nose, looking ahead
    Forward,
    /// Mounted on the tail, looking behind
    Rearward,
}

impl SensorDirection {
    /// Angle the sensor azimuth is subtracted from to obtain the polar angle
    /// in the ego body frame (x right, y ahead).
    pub fn boresight_angle(self) -> f64 {
        match self {
            SensorDirection::Forward => FRAC_PI_2,
            SensorDirection::Rearward => 3.0 * FRAC_PI_2,
        }
    }

    /// Map a sensor azimuth to the body-frame polar angle.
    pub fn body_angle(self, azimuth: f64) -> f64 {
        self.boresight_angle() - azimuth
    }

    /// Inverse of [`SensorDirection::body_angle`], wrapped to (−π, π].
    pub fn sensor_azimuth(self, body_angle: f64) -> f64 {
        let az = (self.boresight_angle() - body_angle + PI).rem_euclid(2.0 * PI) - PI;
        if az <= -PI {
            PI
        } else {
            az
        }
    }

    /// +1 for the nose, −1 for the tail.
    pub fn mount_sign(self) -> f64 {
        match self {
            SensorDirection::Forward => 1.0,
            SensorDirection::Rearward => -1.0,
        }
    }

    pub fn is_forward(self) -> bool {
        matches!(self, SensorDirection::Forward)
    }
}

/// A single radar detection in sensor-native units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadarReturn {
    /// Seconds since trip start; shares the clock of the ego samples
    pub time: f64,
    /// Range to target (ft); negative when the channel is empty
    pub range: f64,
    /// Range rate (ft/s), positive for increasing range
    pub range_rate: f64,
    /// Azimuth from boresight (rad)
    pub azimuth: f64,
    /// Upstream tracker channel id; identifies the target within one radar
    pub channel: u32,
}

impl RadarReturn {
    pub fn has_range(&self) -> bool {
        self.range >= 0.0
    }

    pub fn range_m(&self) -> f64 {
        ft_to_m(self.range)
    }

    pub fn range_rate_mps(&self) -> f64 {
        ft_to_m(self.range_rate)
    }
}

/// Physical configuration of an onboard radar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RadarParams {
    pub direction: SensorDirection,
    /// Maximum detection range (meters)
    pub max_range: f64,
    /// Field of view half-angle around boresight (radians)
    pub fov_half: f64,
    /// Probability of detection per target per scan
    pub p_detection: f64,
    /// Measurement noise: range (meters, uniform half-width)
    pub range_noise: f64,
    /// Measurement noise: range rate (m/s, uniform half-width)
    pub range_rate_noise: f64,
    /// Measurement noise: azimuth (radians, uniform half-width)
    pub azimuth_noise: f64,
}

impl RadarParams {
    pub fn forward() -> Self {
        Self::default()
    }

    pub fn rearward() -> Self {
        Self {
            direction: SensorDirection::Rearward,
            ..Self::default()
        }
    }

    /// True if a target at (`range` m, `azimuth` rad) lies inside the beam.
    pub fn covers(&self, range: f64, azimuth: f64) -> bool {
        range <= self.max_range && azimuth.abs() <= self.fov_half
    }
}

impl Default for RadarParams {
    fn default() -> Self {
        Self {
            direction: SensorDirection::Forward,
            max_range: 150.0,
            fov_half: 0.26, // ~15°
            p_detection: 0.95,
            range_noise: 0.3,
            range_rate_noise: 0.1,
            azimuth_noise: 0.002,
        }
    }
}
