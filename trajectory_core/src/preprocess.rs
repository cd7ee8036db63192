//! Ego channel preparation: SI conversion, gap filling, yaw-rate floor,
//! time-order checks and step intervals.

use crate::error::{ReconstructError, Result};
use sensor_models::EgoSample;
use tracing::warn;

/// Smallest yaw-rate magnitude (rad/s) fed to the CTRA filter.
pub const MIN_YAW_RATE: f64 = 1e-6;

/// Floor |ω| at [`MIN_YAW_RATE`], keeping the sign. Zero maps to +floor.
pub fn floor_yaw_rate(omega: f64) -> f64 {
    if omega >= 0.0 {
        omega.max(MIN_YAW_RATE)
    } else {
        omega.min(-MIN_YAW_RATE)
    }
}

/// Fail unless `times` is non-empty, finite and strictly increasing.
pub fn check_time_order(times: &[f64]) -> Result<()> {
    if times.is_empty() {
        return Err(ReconstructError::EmptyRun);
    }
    for (index, pair) in times.windows(2).enumerate() {
        let (previous, current) = (pair[0], pair[1]);
        if !(current > previous) || !current.is_finite() {
            return Err(ReconstructError::NonMonotonicTime {
                index: index + 1,
                previous,
                current,
            });
        }
    }
    if !times[0].is_finite() {
        return Err(ReconstructError::NonMonotonicTime {
            index: 0,
            previous: times[0],
            current: times[0],
        });
    }
    Ok(())
}

/// Elapsed time between consecutive samples in run order.
/// Element 0 is zero; the run starts there.
pub fn step_intervals(times: &[f64]) -> Vec<f64> {
    let mut dts = Vec::with_capacity(times.len());
    if !times.is_empty() {
        dts.push(0.0);
    }
    dts.extend(times.windows(2).map(|w| w[1] - w[0]));
    dts
}

/// Linearly interpolate missing values over `times`, using only the present
/// ones. Before the first / after the last present value the nearest present
/// value is held. Returns `None` if no value is present at all.
pub fn fill_gaps(times: &[f64], values: &[Option<f64>]) -> Option<Vec<f64>> {
    let known: Vec<(f64, f64)> = times
        .iter()
        .zip(values)
        .filter_map(|(&t, v)| v.map(|v| (t, v)))
        .collect();
    if known.is_empty() {
        return None;
    }

    let filled = times
        .iter()
        .zip(values)
        .map(|(&t, v)| match v {
            Some(v) => *v,
            None => interpolate(&known, t),
        })
        .collect();
    Some(filled)
}

fn interpolate(known: &[(f64, f64)], t: f64) -> f64 {
    let upper = known.partition_point(|&(tk, _)| tk < t);
    if upper == 0 {
        return known[0].1;
    }
    if upper == known.len() {
        return known[known.len() - 1].1;
    }
    let (t0, v0) = known[upper - 1];
    let (t1, v1) = known[upper];
    if t1 == t0 {
        return v1;
    }
    v0 + (v1 - v0) * (t - t0) / (t1 - t0)
}

/// Ego channels in SI units, gap-free, in run order.
#[derive(Clone, Debug, PartialEq)]
pub struct EgoChannels {
    pub time: Vec<f64>,
    /// m/s; negative where the recorder had no reading
    pub speed: Vec<f64>,
    /// rad/s, floored away from zero
    pub yaw_rate: Vec<f64>,
    /// m/s²
    pub acc_lat: Vec<f64>,
    /// m/s²
    pub acc_lon: Vec<f64>,
}

impl EgoChannels {
    /// Convert samples that are already in ascending time order.
    pub fn from_samples(samples: &[EgoSample]) -> Result<Self> {
        let time: Vec<f64> = samples.iter().map(|s| s.time).collect();
        check_time_order(&time)?;

        let trip = samples[0].trip_id;
        let acc_lat = fill_channel(
            trip,
            "lateral",
            &time,
            &samples.iter().map(EgoSample::acc_lat_mps2).collect::<Vec<_>>(),
        );
        let acc_lon = fill_channel(
            trip,
            "longitudinal",
            &time,
            &samples.iter().map(EgoSample::acc_lon_mps2).collect::<Vec<_>>(),
        );

        Ok(Self {
            speed: samples.iter().map(EgoSample::speed_mps).collect(),
            yaw_rate: samples
                .iter()
                .map(|s| floor_yaw_rate(s.yaw_rate_rad()))
                .collect(),
            time,
            acc_lat,
            acc_lon,
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Flip every channel end to end.
    pub fn reverse(&mut self) {
        self.time.reverse();
        self.speed.reverse();
        self.yaw_rate.reverse();
        self.acc_lat.reverse();
        self.acc_lon.reverse();
    }

    /// Squared total horizontal acceleration at sample `k`.
    pub fn acc_square(&self, k: usize) -> f64 {
        self.acc_lat[k].powi(2) + self.acc_lon[k].powi(2)
    }

    /// Mean longitudinal acceleration over the three samples centred on `k`,
    /// clipped to the ends of the sequence.
    pub fn mean_acc_lon_around(&self, k: usize) -> f64 {
        let lo = k.saturating_sub(1);
        let hi = (k + 1).min(self.len() - 1);
        let window = &self.acc_lon[lo..=hi];
        window.iter().sum::<f64>() / window.len() as f64
    }
}

fn fill_channel(trip: u64, name: &str, time: &[f64], values: &[Option<f64>]) -> Vec<f64> {
    match fill_gaps(time, values) {
        Some(filled) => filled,
        None => {
            warn!(trip, channel = name, "acceleration channel empty, assuming zero");
            vec![0.0; time.len()]
        }
    }
}
