//! Faults that abort a single filter run.
//!
//! Data-quality conditions (unanchored trips, short tracks, missing samples)
//! are not errors; they are reported through the normal return values.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ReconstructError {
    #[error("run contains no samples")]
    EmptyRun,

    #[error("time is not strictly increasing at sample {index}: {previous} s -> {current} s")]
    NonMonotonicTime {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("invalid configuration: {field} = {value}")]
    InvalidConfig { field: &'static str, value: f64 },

    #[error("innovation covariance is singular at step {step}")]
    SingularInnovation { step: usize },
}

pub type Result<T> = std::result::Result<T, ReconstructError>;
