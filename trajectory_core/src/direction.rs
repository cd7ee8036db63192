//! Forward/reverse run selection for the ego filter.
//!
//! A run is anchored at its starting end: the initial speed comes from the
//! first samples it consumes, so those must carry a real speed reading. When
//! both ends qualify the two runs are compared on how well the filtered
//! speed follows the measured one, with a small bias towards the forward run.

use crate::{
    config::{EgoFilterConfig, SelectorConfig},
    ctra::EgoStateEstimator,
    error::{ReconstructError, Result},
    metrics::speed_fit_error,
    types::{EgoState, RunDirection},
};
use sensor_models::EgoSample;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Which ends of a trip can anchor a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Anchors {
    pub leading: bool,
    pub trailing: bool,
}

impl Anchors {
    /// An end is valid when its first (or last) `len` speed samples are all
    /// present. Shorter trips use all samples.
    pub fn of(samples: &[EgoSample], len: usize) -> Self {
        let n = len.min(samples.len());
        Self {
            leading: samples[..n].iter().all(EgoSample::has_speed),
            trailing: samples[samples.len() - n..].iter().all(EgoSample::has_speed),
        }
    }
}

/// Tie-break between two complete runs: keep the forward run unless the
/// reverse run beats it by more than `tolerance` per valid sample.
pub fn prefer_forward(error_forward: f64, error_reverse: f64, valid_count: usize, tolerance: f64) -> bool {
    error_forward < error_reverse + tolerance * valid_count as f64
}

/// The authoritative ego run of one trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectedRun {
    pub direction: RunDirection,
    /// Aligned with the input samples, ascending time
    pub states: Vec<EgoState>,
    /// Speed fit error of the forward run, when it was computed
    pub forward_error: Option<f64>,
    /// Speed fit error of the reverse run, when it was computed
    pub reverse_error: Option<f64>,
    /// Samples with a valid speed reading
    pub valid_count: usize,
}

/// Outcome of the selector for one trip.
#[derive(Clone, Debug, PartialEq)]
pub enum EgoReconstruction {
    Reconstructed(SelectedRun),
    /// Neither end has a valid speed anchor; nothing was filtered
    Unanchored,
}

/// Decides which direction(s) to run the ego filter in and picks the result.
#[derive(Clone, Debug)]
pub struct DirectionalRunSelector {
    estimator: EgoStateEstimator,
    config: SelectorConfig,
}

impl DirectionalRunSelector {
    pub fn new(filter: EgoFilterConfig, config: SelectorConfig) -> Self {
        Self {
            estimator: EgoStateEstimator::new(filter),
            config,
        }
    }

    pub fn estimator(&self) -> &EgoStateEstimator {
        &self.estimator
    }

    pub fn select(&self, samples: &[EgoSample]) -> Result<EgoReconstruction> {
        if samples.is_empty() {
            return Err(ReconstructError::EmptyRun);
        }
        let trip = samples[0].trip_id;
        let anchors = Anchors::of(samples, self.config.anchor_len);

        let run = match (anchors.leading, anchors.trailing) {
            (false, false) => {
                warn!(trip, "no valid speed anchor at either end, trip not reconstructed");
                return Ok(EgoReconstruction::Unanchored);
            }
            (true, false) => self.single(samples, RunDirection::Forward)?,
            (false, true) => self.single(samples, RunDirection::Reverse)?,
            (true, true) => self.both(samples)?,
        };

        debug!(
            trip,
            direction = %run.direction,
            forward_error = ?run.forward_error,
            reverse_error = ?run.reverse_error,
            "ego run selected"
        );
        Ok(EgoReconstruction::Reconstructed(run))
    }

    fn single(&self, samples: &[EgoSample], direction: RunDirection) -> Result<SelectedRun> {
        let states = self.estimator.estimate(samples, direction)?;
        let (error, valid_count) = speed_fit_error(&states, samples);
        let (forward_error, reverse_error) = match direction {
            RunDirection::Forward => (Some(error), None),
            RunDirection::Reverse => (None, Some(error)),
        };
        Ok(SelectedRun {
            direction,
            states,
            forward_error,
            reverse_error,
            valid_count,
        })
    }

    fn both(&self, samples: &[EgoSample]) -> Result<SelectedRun> {
        let (forward, reverse) = rayon::join(
            || self.estimator.estimate(samples, RunDirection::Forward),
            || self.estimator.estimate(samples, RunDirection::Reverse),
        );
        Ok(self.choose(forward?, reverse?, samples))
    }

    /// Pick between two complete runs over the same samples.
    fn choose(&self, forward: Vec<EgoState>, reverse: Vec<EgoState>, samples: &[EgoSample]) -> SelectedRun {
        let (error_forward, valid_count) = speed_fit_error(&forward, samples);
        let (error_reverse, _) = speed_fit_error(&reverse, samples);

        let (direction, states) =
            if prefer_forward(error_forward, error_reverse, valid_count, self.config.fit_tolerance) {
                (RunDirection::Forward, forward)
            } else {
                (RunDirection::Reverse, reverse)
            };

        SelectedRun {
            direction,
            states,
            forward_error: Some(error_forward),
            reverse_error: Some(error_reverse),
            valid_count,
        }
    }
}
