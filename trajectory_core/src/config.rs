//! Filter and pipeline configuration.
//!
//! Uncertainties are used directly as variances on the covariance diagonals;
//! the `max_*` limits scale the per-step process noise.

use crate::error::{ReconstructError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};

/// Parameters of the ego CTRA filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EgoFilterConfig {
    /// Initial state variance (all six states)
    pub initial_uncertainty: f64,
    /// Speed measurement variance ((m/s)²)
    pub speed_uncertainty: f64,
    /// Yaw-rate measurement variance ((rad/s)²)
    pub yaw_rate_uncertainty: f64,
    /// Longitudinal acceleration measurement variance ((m/s²)²)
    pub acceleration_uncertainty: f64,
    /// m/s³
    pub max_jerk: f64,
    /// rad/s
    pub max_yaw_rate: f64,
    /// m/s²
    pub max_acceleration: f64,
    /// rad/s²
    pub max_yaw_acceleration: f64,
}

impl Default for EgoFilterConfig {
    fn default() -> Self {
        Self {
            initial_uncertainty: 100.0,
            speed_uncertainty: 10.0,
            yaw_rate_uncertainty: 5.0,
            acceleration_uncertainty: 5.0,
            max_jerk: 15.0,
            max_yaw_rate: FRAC_PI_2,
            max_acceleration: 9.8,
            max_yaw_acceleration: TAU,
        }
    }
}

impl EgoFilterConfig {
    pub fn validate(&self) -> Result<()> {
        positive("ego.initial_uncertainty", self.initial_uncertainty)?;
        positive("ego.speed_uncertainty", self.speed_uncertainty)?;
        positive("ego.yaw_rate_uncertainty", self.yaw_rate_uncertainty)?;
        positive("ego.acceleration_uncertainty", self.acceleration_uncertainty)?;
        positive("ego.max_jerk", self.max_jerk)?;
        positive("ego.max_yaw_rate", self.max_yaw_rate)?;
        positive("ego.max_acceleration", self.max_acceleration)?;
        positive("ego.max_yaw_acceleration", self.max_yaw_acceleration)
    }
}

/// Parameters of the surrounding-vehicle CHCV filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurroundingFilterConfig {
    pub initial_uncertainty: f64,
    /// Position measurement variance (m²), both axes
    pub position_uncertainty: f64,
    /// Speed measurement variance ((m/s)²)
    pub speed_uncertainty: f64,
    pub max_acceleration: f64,
    pub max_yaw_rate: f64,
}

impl Default for SurroundingFilterConfig {
    fn default() -> Self {
        Self {
            initial_uncertainty: 1000.0,
            position_uncertainty: 500.0,
            speed_uncertainty: 10.0,
            max_acceleration: 9.8,
            max_yaw_rate: FRAC_PI_2,
        }
    }
}

impl SurroundingFilterConfig {
    pub fn validate(&self) -> Result<()> {
        positive("surrounding.initial_uncertainty", self.initial_uncertainty)?;
        positive("surrounding.position_uncertainty", self.position_uncertainty)?;
        positive("surrounding.speed_uncertainty", self.speed_uncertainty)?;
        positive("surrounding.max_acceleration", self.max_acceleration)?;
        positive("surrounding.max_yaw_rate", self.max_yaw_rate)
    }
}

/// Forward/reverse run selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Number of leading/trailing speed samples that must all be valid
    pub anchor_len: usize,
    /// Per-sample speed error (m/s) the reverse run must beat the forward run by
    pub fit_tolerance: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            anchor_len: 5,
            fit_tolerance: 0.02,
        }
    }
}

impl SelectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.anchor_len == 0 {
            return Err(ReconstructError::InvalidConfig {
                field: "selector.anchor_len",
                value: 0.0,
            });
        }
        if !self.fit_tolerance.is_finite() || self.fit_tolerance < 0.0 {
            return Err(ReconstructError::InvalidConfig {
                field: "selector.fit_tolerance",
                value: self.fit_tolerance,
            });
        }
        Ok(())
    }
}

/// Radar-to-world projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Tracks with fewer projected observations are not filtered
    pub min_track_observations: usize,
    /// Ego length (m) used when a trip does not provide one
    pub default_ego_length: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            min_track_observations: 10,
            default_ego_length: 4.5,
        }
    }
}

impl ProjectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_track_observations == 0 {
            return Err(ReconstructError::InvalidConfig {
                field: "projection.min_track_observations",
                value: 0.0,
            });
        }
        positive("projection.default_ego_length", self.default_ego_length)
    }
}

/// Everything the trip pipeline needs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub ego: EgoFilterConfig,
    pub surrounding: SurroundingFilterConfig,
    pub selector: SelectorConfig,
    pub projection: ProjectionConfig,
}

impl ReconstructionConfig {
    pub fn validate(&self) -> Result<()> {
        self.ego.validate()?;
        self.surrounding.validate()?;
        self.selector.validate()?;
        self.projection.validate()
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ReconstructError::InvalidConfig { field, value })
    }
}
