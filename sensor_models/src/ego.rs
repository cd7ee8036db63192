//! Ego-vehicle sample as recorded by the onboard data acquisition system.
//!
//! Values stay in recorder units (mph, deg/s, g). Conversion to SI happens
//! in the reconstruction core, right before filtering.

use crate::units::{g_to_mps2, mph_to_mps};
use serde::{Deserialize, Serialize};

/// One row of the ego time series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EgoSample {
    pub trip_id: u64,
    /// Frame sync counter used to align with video / event annotations
    pub sync: i64,
    /// Seconds since trip start
    pub time: f64,
    /// Network speed (mph); negative when unavailable
    pub speed: f64,
    /// Yaw rate (deg/s), positive for a left turn
    pub yaw_rate: f64,
    /// Lateral acceleration (g), positive for a left turn
    pub acc_lat: Option<f64>,
    /// Longitudinal acceleration (g)
    pub acc_lon: Option<f64>,
    /// GPS speed (mph), pass-through
    #[serde(default)]
    pub speed_gps: Option<f64>,
    /// Compass heading (deg, 0 = North), pass-through
    #[serde(default)]
    pub heading: Option<f64>,
    /// Brake pedal switch, pass-through
    #[serde(default)]
    pub brake: Option<u8>,
    /// Turn signal (0 off, 1 left, 2 right, 3 both), pass-through
    #[serde(default)]
    pub signal: Option<u8>,
}

impl EgoSample {
    /// True when the speed channel carries a reading.
    pub fn has_speed(&self) -> bool {
        self.speed >= 0.0
    }

    /// Speed in m/s. The missing-value sentinel is converted too and stays
    /// negative.
    pub fn speed_mps(&self) -> f64 {
        mph_to_mps(self.speed)
    }

    pub fn yaw_rate_rad(&self) -> f64 {
        self.yaw_rate.to_radians()
    }

    pub fn acc_lat_mps2(&self) -> Option<f64> {
        self.acc_lat.map(g_to_mps2)
    }

    pub fn acc_lon_mps2(&self) -> Option<f64> {
        self.acc_lon.map(g_to_mps2)
    }
}
