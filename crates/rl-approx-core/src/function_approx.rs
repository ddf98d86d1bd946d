//! The function approximator interface
//!
//! A [`FunctionApprox`] approximates some function `X -> f64` from observed
//! `(x, y)` pairs. Every approximator is an immutable value: updating or
//! solving returns a new approximator and leaves the receiver as it was, so a
//! training run is a chain (or a lazy stream) of successive snapshots.

use ndarray::{Array1, ArrayView1};

use crate::gradient::{Gradient, Parameterized};
use crate::iterate::{accumulate, ConvergeExt};
use crate::{ApproxError, Result};

/// Convergence tolerance used by `solve` when the caller gives none
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Approximation of a real-valued function over the domain `X`
pub trait FunctionApprox<X: Clone>: Parameterized {
    /// Predicted value for each input, in input order.
    ///
    /// Inputs never seen during training still get a prediction; what that
    /// prediction is depends on the approximator.
    fn evaluate(&self, xs: &[X]) -> Array1<f64>;

    /// Gradient of an objective with respect to the internal parameters.
    ///
    /// `obj_deriv_out` receives every `x` and every `y` of `xy_pairs` and
    /// returns, for each example, the derivative of the objective with
    /// respect to this approximator's output at that `x`. Squared-error
    /// regression passes `prediction - y`; policy-gradient methods pass their
    /// own score function.
    ///
    /// # Errors
    ///
    /// [`ApproxError::EmptyInput`] if `xy_pairs` is empty,
    /// [`ApproxError::ShapeMismatch`] if `obj_deriv_out` does not return one
    /// derivative per example.
    fn objective_gradient<D>(&self, xy_pairs: &[(X, f64)], obj_deriv_out: D) -> Result<Gradient<Self>>
    where
        D: FnOnce(&[X], &[f64]) -> Array1<f64>;

    /// Approximator after applying a previously computed gradient
    ///
    /// # Errors
    ///
    /// [`ApproxError::ShapeMismatch`] or [`ApproxError::VariantMismatch`] if
    /// the gradient was not computed for an approximator of this shape.
    fn update_with_gradient(&self, gradient: &Gradient<Self>) -> Result<Self>;

    /// True if `other` has every parameter within `tolerance` of this one
    fn within(&self, other: &Self, tolerance: f64) -> bool;

    /// Fit the whole data set.
    ///
    /// By default this repeats [`FunctionApprox::update`] over `xy_pairs`
    /// until two successive approximators are [`within`](FunctionApprox::within)
    /// `tolerance` (default [`DEFAULT_TOLERANCE`]) of each other. There is no
    /// iteration cap: if the updates never settle, this never returns.
    ///
    /// # Errors
    ///
    /// [`ApproxError::EmptyInput`] if `xy_pairs` is empty, or any error
    /// raised by an update.
    fn solve(&self, xy_pairs: &[(X, f64)], tolerance: Option<f64>) -> Result<Self> {
        solve_by_convergence(self, xy_pairs, tolerance)
    }

    /// Predicted value at a single input
    fn value(&self, x: &X) -> f64 {
        self.evaluate(std::slice::from_ref(x))[0]
    }

    /// One incremental step towards the targets in `xy_pairs`, minimising
    /// squared error
    ///
    /// # Errors
    ///
    /// Same as [`FunctionApprox::objective_gradient`].
    fn update(&self, xy_pairs: &[(X, f64)]) -> Result<Self> {
        let gradient = self.objective_gradient(xy_pairs, |xs, ys| {
            self.evaluate(xs) - &ArrayView1::from(ys)
        })?;
        self.update_with_gradient(&gradient)
    }

    /// Lazy stream `self, self.update(d1), self.update(d1).update(d2), ...`
    /// with one update per data set of `xy_seq_stream`.
    ///
    /// A failed update is yielded in place and repeated for every later data
    /// set; the stream is as long as `xy_seq_stream` plus one.
    fn iterate_updates<I>(&self, xy_seq_stream: I) -> impl Iterator<Item = Result<Self>>
    where
        I: IntoIterator,
        I::Item: AsRef<[(X, f64)]>,
    {
        accumulate(
            xy_seq_stream,
            |approx: Result<Self>, xy_pairs| approx.and_then(|a| a.update(xy_pairs.as_ref())),
            Ok(self.clone()),
        )
    }

    /// Root-mean-square error of the predictions against the targets
    ///
    /// # Errors
    ///
    /// [`ApproxError::EmptyInput`] if `xy_pairs` is empty.
    #[allow(clippy::cast_precision_loss)]
    fn rmse(&self, xy_pairs: &[(X, f64)]) -> Result<f64> {
        if xy_pairs.is_empty() {
            return Err(ApproxError::empty("rmse over no examples"));
        }
        let (xs, ys): (Vec<X>, Vec<f64>) = xy_pairs.iter().cloned().unzip();
        let errors = self.evaluate(&xs) - &ArrayView1::from(&ys);
        Ok((errors.mapv(|e| e * e).sum() / xs.len() as f64).sqrt())
    }

    /// The input with the largest prediction; the first one wins ties
    ///
    /// # Errors
    ///
    /// [`ApproxError::EmptyInput`] if `xs` is empty.
    fn argmax<'a>(&self, xs: &'a [X]) -> Result<&'a X> {
        let values = self.evaluate(xs);
        let mut best: Option<(usize, f64)> = None;
        for (i, &v) in values.iter().enumerate() {
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((i, v));
            }
        }
        best.map(|(i, _)| &xs[i])
            .ok_or_else(|| ApproxError::empty("argmax over no candidates"))
    }
}

/// Split `(x, y)` pairs, run `obj_deriv_out` over them and check it returned
/// one derivative per example.
///
/// # Errors
///
/// [`ApproxError::EmptyInput`] if `xy_pairs` is empty,
/// [`ApproxError::ShapeMismatch`] on a derivative of the wrong length.
pub fn objective_derivative<X, D>(xy_pairs: &[(X, f64)], obj_deriv_out: D) -> Result<(Vec<X>, Array1<f64>)>
where
    X: Clone,
    D: FnOnce(&[X], &[f64]) -> Array1<f64>,
{
    if xy_pairs.is_empty() {
        return Err(ApproxError::empty("objective gradient over no examples"));
    }
    let (xs, ys): (Vec<X>, Vec<f64>) = xy_pairs.iter().cloned().unzip();
    let derivative = obj_deriv_out(&xs, &ys);
    if derivative.len() != xs.len() {
        return Err(ApproxError::shape(&[xs.len()], derivative.shape()));
    }
    Ok((xs, derivative))
}

/// Repeat `update` over a fixed data set until successive approximators are
/// within `tolerance`. Never returns if they do not settle.
///
/// # Errors
///
/// [`ApproxError::EmptyInput`] if `xy_pairs` is empty, or the first error
/// raised by an update.
pub fn solve_by_convergence<X, F>(approx: &F, xy_pairs: &[(X, f64)], tolerance: Option<f64>) -> Result<F>
where
    X: Clone,
    F: FunctionApprox<X>,
{
    if xy_pairs.is_empty() {
        return Err(ApproxError::empty("solve over no examples"));
    }
    let tolerance = tolerance.unwrap_or(DEFAULT_TOLERANCE);
    let mut iterations = 0usize;
    let solved = approx
        .iterate_updates(std::iter::repeat(xy_pairs))
        .inspect(|_| iterations += 1)
        .converged(|a, b| match (a, b) {
            (Ok(a), Ok(b)) => a.within(b, tolerance),
            _ => true,
        })??;
    tracing::debug!(iterations, tolerance, "iterative solve converged");
    Ok(solved)
}
