//! Gradients shaped like the approximators they differentiate
//!
//! A [`Gradient`] wraps a value of the approximator's own type whose
//! parameters hold partial derivatives instead of learned values. Computing a
//! gradient and applying it are separate steps, so callers can scale or sum
//! gradients (for example by a discounted return) before applying them.

use crate::Result;

/// Parameter-wise arithmetic shared by approximators and their gradients
pub trait Parameterized: Clone {
    /// Parameter-wise sum with `other`; everything that is not a parameter
    /// (optimizer state, feature functions, schedules) comes from `self`
    ///
    /// # Errors
    ///
    /// [`crate::ApproxError::ShapeMismatch`] or
    /// [`crate::ApproxError::VariantMismatch`] if the two do not line up.
    fn combine(&self, other: &Self) -> Result<Self>;

    /// Every parameter multiplied by `factor`
    #[must_use]
    fn scale(&self, factor: f64) -> Self;

    /// Additive identity of [`Parameterized::combine`]: combining it with any
    /// value of the same shape gives that value back
    #[must_use]
    fn zero(&self) -> Self {
        self.scale(0.0)
    }
}

/// Derivative of an objective with respect to the parameters of `F`
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient<F> {
    function_approx: F,
}

impl<F> Gradient<F> {
    /// Wrap a value whose parameters are gradient components
    #[must_use]
    pub fn new(function_approx: F) -> Self {
        Self { function_approx }
    }

    /// The wrapped gradient components
    #[must_use]
    pub fn function_approx(&self) -> &F {
        &self.function_approx
    }

    /// Unwrap the gradient components
    #[must_use]
    pub fn into_inner(self) -> F {
        self.function_approx
    }
}

impl<F: Parameterized> Gradient<F> {
    /// Gradient with every component multiplied by `factor`
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.function_approx.scale(factor))
    }

    /// Gradient of the same shape with every component zero
    #[must_use]
    pub fn zero(&self) -> Self {
        Self::new(self.function_approx.zero())
    }
}

/// Component-wise sum of two gradients
///
/// # Errors
///
/// Propagates the shape or variant mismatch reported by
/// [`Parameterized::combine`].
pub fn combine_gradients<F: Parameterized>(a: &Gradient<F>, b: &Gradient<F>) -> Result<Gradient<F>> {
    Ok(Gradient::new(a.function_approx.combine(&b.function_approx)?))
}

/// Add a gradient's components straight onto an approximator's parameters,
/// bypassing any optimizer. The approximator keeps its own optimizer state.
///
/// # Errors
///
/// Propagates the shape or variant mismatch reported by
/// [`Parameterized::combine`].
pub fn apply_as_update<F: Parameterized>(approx: &F, gradient: &Gradient<F>) -> Result<F> {
    approx.combine(&gradient.function_approx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApproxError;
    use ndarray::{arr1, Array1};

    #[derive(Debug, Clone, PartialEq)]
    struct Params(Array1<f64>);

    impl Parameterized for Params {
        fn combine(&self, other: &Self) -> Result<Self> {
            if self.0.len() != other.0.len() {
                return Err(ApproxError::shape(self.0.shape(), other.0.shape()));
            }
            Ok(Self(&self.0 + &other.0))
        }

        fn scale(&self, factor: f64) -> Self {
            Self(&self.0 * factor)
        }
    }

    #[test]
    fn test_combine_gradients() {
        let a = Gradient::new(Params(arr1(&[1.0, 2.0])));
        let b = Gradient::new(Params(arr1(&[0.5, -1.0])));
        let sum = combine_gradients(&a, &b).unwrap();
        assert_eq!(sum.function_approx(), &Params(arr1(&[1.5, 1.0])));
    }

    #[test]
    fn test_combine_mismatched_shapes() {
        let a = Gradient::new(Params(arr1(&[1.0, 2.0])));
        let b = Gradient::new(Params(arr1(&[1.0])));
        assert!(matches!(
            combine_gradients(&a, &b),
            Err(ApproxError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_scale_and_zero() {
        let g = Gradient::new(Params(arr1(&[1.0, -3.0])));
        assert_eq!(g.scale(2.0).into_inner(), Params(arr1(&[2.0, -6.0])));
        assert_eq!(g.zero().into_inner(), Params(arr1(&[0.0, 0.0])));
    }

    #[test]
    fn test_apply_as_update() {
        let approx = Params(arr1(&[10.0, 20.0]));
        let g = Gradient::new(Params(arr1(&[-1.0, 1.0])));
        assert_eq!(apply_as_update(&approx, &g).unwrap(), Params(arr1(&[9.0, 21.0])));
    }
}
