//! Extended Kalman Filter recursion shared by the ego and surrounding models.
//!
//! A model supplies the nonlinear motion function, its Jacobian, process and
//! measurement noise and the invariants its state must satisfy. The caller
//! supplies one [`Correction`] per step, already gated: rows of channels that
//! carry no information that step are zero in `h`, and residual components
//! that must not pull the state are masked out.
//!
//! Both models observe three quantities, so the innovation covariance is a
//! fixed 3×3 matrix inverted in closed form.

use crate::error::{ReconstructError, Result};
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

/// State estimate and covariance of one filter run.
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate<const N: usize> {
    pub state: SVector<f64, N>,
    pub cov: SMatrix<f64, N, N>,
}

impl<const N: usize> Estimate<N> {
    /// Start from `state` with an isotropic covariance.
    pub fn new(state: SVector<f64, N>, initial_variance: f64) -> Self {
        Self {
            state,
            cov: SMatrix::<f64, N, N>::identity() * initial_variance,
        }
    }
}

/// Measurement and observation Jacobian for one step.
#[derive(Clone, Debug, PartialEq)]
pub struct Correction<const N: usize> {
    /// Measured values
    pub z: Vector3<f64>,
    /// Observation Jacobian; zero rows disable a channel
    pub h: SMatrix<f64, 3, N>,
    /// `false` forces the matching residual component to zero
    pub use_residual: [bool; 3],
}

/// Nonlinear motion and measurement model.
pub trait MotionModel<const N: usize> {
    /// Deterministic state propagation over `dt` seconds.
    fn propagate(&self, state: &SVector<f64, N>, dt: f64) -> SVector<f64, N>;

    /// ∂f/∂x evaluated at `state`.
    fn jacobian(&self, state: &SVector<f64, N>, dt: f64) -> SMatrix<f64, N, N>;

    /// Process noise Q for a step of `dt` seconds.
    fn process_noise(&self, dt: f64) -> SMatrix<f64, N, N>;

    /// Expected measurement h(x).
    fn observe(&self, state: &SVector<f64, N>) -> Vector3<f64>;

    /// Measurement noise R.
    fn measurement_noise(&self) -> Matrix3<f64>;

    /// Restore state invariants after a correction.
    fn constrain(&self, estimate: &mut Estimate<N>);
}

/// Intermediate quantities of one step, exposed for diagnostics and tests.
#[derive(Clone, Debug)]
pub struct StepResult {
    /// Innovation ν = z − h(x̂⁻) after masking
    pub innovation: Vector3<f64>,
    /// Innovation covariance S = H·P·Hᵀ + R
    pub innovation_cov: Matrix3<f64>,
}

/// Advance `estimate` by one predict/correct cycle.
pub fn step<const N: usize, M: MotionModel<N>>(
    model: &M,
    estimate: &mut Estimate<N>,
    dt: f64,
    correction: &Correction<N>,
    step_index: usize,
) -> Result<StepResult> {
    // Predict; the linearisation point is the propagated state.
    let predicted = model.propagate(&estimate.state, dt);
    let f = model.jacobian(&predicted, dt);
    let p = f * estimate.cov * f.transpose() + model.process_noise(dt);

    // Innovation covariance: S = H·P·Hᵀ + R
    let h = &correction.h;
    let r = model.measurement_noise();
    let s = h * p * h.transpose() + r;
    let s_inv = s
        .try_inverse()
        .ok_or(ReconstructError::SingularInnovation { step: step_index })?;

    // Kalman gain: K = P·Hᵀ·S⁻¹
    let k = p * h.transpose() * s_inv;

    let mut innovation = correction.z - model.observe(&predicted);
    for (i, keep) in correction.use_residual.iter().enumerate() {
        if !keep {
            innovation[i] = 0.0;
        }
    }

    // Joseph form P' = (I−KH)·P·(I−KH)ᵀ + K·R·Kᵀ
    let i_kh = SMatrix::<f64, N, N>::identity() - k * h;
    estimate.state = predicted + k * innovation;
    estimate.cov = i_kh * p * i_kh.transpose() + k * r * k.transpose();
    model.constrain(estimate);

    Ok(StepResult {
        innovation,
        innovation_cov: s,
    })
}

/// Run the recursion over a whole sequence.
///
/// Element 0 of the output is the initial state; every later element is the
/// result of one step with the interval and correction returned by `input`.
pub fn run<const N: usize, M, F>(
    model: &M,
    initial: Estimate<N>,
    len: usize,
    mut input: F,
) -> Result<Vec<SVector<f64, N>>>
where
    M: MotionModel<N>,
    F: FnMut(usize) -> (f64, Correction<N>),
{
    let mut out = Vec::with_capacity(len);
    if len == 0 {
        return Ok(out);
    }
    let mut estimate = initial;
    out.push(estimate.state);
    for k in 1..len {
        let (dt, correction) = input(k);
        step(model, &mut estimate, dt, &correction, k)?;
        out.push(estimate.state);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
