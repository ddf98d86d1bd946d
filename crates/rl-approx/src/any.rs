//! Closed sum over the concrete approximators

use std::hash::Hash;

use ndarray::Array1;
use rl_approx_core::{ApproxError, FunctionApprox, Gradient, Parameterized, Result};

use crate::{DnnApprox, Dynamic, LinearApprox, Tabular};

/// Any of the four approximators behind one type.
///
/// Lets callers pick the variant at run time and compare approximators of
/// possibly different kinds: [`within`](FunctionApprox::within) across
/// variants is simply `false`, while [`combine`](Parameterized::combine) and
/// [`update_with_gradient`](FunctionApprox::update_with_gradient) across
/// variants fail with [`ApproxError::VariantMismatch`].
///
/// The table variants need hashable inputs, so the whole enum does.
#[derive(Debug, Clone)]
pub enum AnyApprox<X> {
    /// Exact table
    Dynamic(Dynamic<X>),
    /// Running-mean table
    Tabular(Tabular<X>),
    /// Linear in features
    Linear(LinearApprox<X>),
    /// Feed-forward network
    Dnn(DnnApprox<X>),
}

impl<X> AnyApprox<X> {
    /// Name of the wrapped variant
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Dynamic(_) => "dynamic",
            Self::Tabular(_) => "tabular",
            Self::Linear(_) => "linear",
            Self::Dnn(_) => "dnn",
        }
    }

    fn mismatch(&self, other: &Self) -> ApproxError {
        ApproxError::VariantMismatch {
            expected: self.variant_name(),
            actual: other.variant_name(),
        }
    }
}

impl<X> From<Dynamic<X>> for AnyApprox<X> {
    fn from(approx: Dynamic<X>) -> Self {
        Self::Dynamic(approx)
    }
}

impl<X> From<Tabular<X>> for AnyApprox<X> {
    fn from(approx: Tabular<X>) -> Self {
        Self::Tabular(approx)
    }
}

impl<X> From<LinearApprox<X>> for AnyApprox<X> {
    fn from(approx: LinearApprox<X>) -> Self {
        Self::Linear(approx)
    }
}

impl<X> From<DnnApprox<X>> for AnyApprox<X> {
    fn from(approx: DnnApprox<X>) -> Self {
        Self::Dnn(approx)
    }
}

impl<X: Clone + Eq + Hash> Parameterized for AnyApprox<X> {
    fn combine(&self, other: &Self) -> Result<Self> {
        match (self, other) {
            (Self::Dynamic(a), Self::Dynamic(b)) => Ok(a.combine(b)?.into()),
            (Self::Tabular(a), Self::Tabular(b)) => Ok(a.combine(b)?.into()),
            (Self::Linear(a), Self::Linear(b)) => Ok(a.combine(b)?.into()),
            (Self::Dnn(a), Self::Dnn(b)) => Ok(a.combine(b)?.into()),
            _ => Err(self.mismatch(other)),
        }
    }

    fn scale(&self, factor: f64) -> Self {
        match self {
            Self::Dynamic(a) => a.scale(factor).into(),
            Self::Tabular(a) => a.scale(factor).into(),
            Self::Linear(a) => a.scale(factor).into(),
            Self::Dnn(a) => a.scale(factor).into(),
        }
    }

    fn zero(&self) -> Self {
        match self {
            Self::Dynamic(a) => a.zero().into(),
            Self::Tabular(a) => a.zero().into(),
            Self::Linear(a) => a.zero().into(),
            Self::Dnn(a) => a.zero().into(),
        }
    }
}

fn wrap<F, X>(gradient: Gradient<F>) -> Gradient<AnyApprox<X>>
where
    F: Into<AnyApprox<X>>,
{
    Gradient::new(gradient.into_inner().into())
}

impl<X: Clone + Eq + Hash> FunctionApprox<X> for AnyApprox<X> {
    fn evaluate(&self, xs: &[X]) -> Array1<f64> {
        match self {
            Self::Dynamic(a) => a.evaluate(xs),
            Self::Tabular(a) => a.evaluate(xs),
            Self::Linear(a) => a.evaluate(xs),
            Self::Dnn(a) => a.evaluate(xs),
        }
    }

    fn objective_gradient<D>(&self, xy_pairs: &[(X, f64)], obj_deriv_out: D) -> Result<Gradient<Self>>
    where
        D: FnOnce(&[X], &[f64]) -> Array1<f64>,
    {
        Ok(match self {
            Self::Dynamic(a) => wrap(a.objective_gradient(xy_pairs, obj_deriv_out)?),
            Self::Tabular(a) => wrap(a.objective_gradient(xy_pairs, obj_deriv_out)?),
            Self::Linear(a) => wrap(a.objective_gradient(xy_pairs, obj_deriv_out)?),
            Self::Dnn(a) => wrap(a.objective_gradient(xy_pairs, obj_deriv_out)?),
        })
    }

    fn update_with_gradient(&self, gradient: &Gradient<Self>) -> Result<Self> {
        match (self, gradient.function_approx()) {
            (Self::Dynamic(a), Self::Dynamic(g)) => Ok(a.update_with_gradient(&Gradient::new(g.clone()))?.into()),
            (Self::Tabular(a), Self::Tabular(g)) => Ok(a.update_with_gradient(&Gradient::new(g.clone()))?.into()),
            (Self::Linear(a), Self::Linear(g)) => Ok(a.update_with_gradient(&Gradient::new(g.clone()))?.into()),
            (Self::Dnn(a), Self::Dnn(g)) => Ok(a.update_with_gradient(&Gradient::new(g.clone()))?.into()),
            (_, other) => Err(self.mismatch(other)),
        }
    }

    fn update(&self, xy_pairs: &[(X, f64)]) -> Result<Self> {
        match self {
            Self::Dynamic(a) => Ok(a.update(xy_pairs)?.into()),
            Self::Tabular(a) => Ok(a.update(xy_pairs)?.into()),
            Self::Linear(a) => Ok(a.update(xy_pairs)?.into()),
            Self::Dnn(a) => Ok(a.update(xy_pairs)?.into()),
        }
    }

    fn solve(&self, xy_pairs: &[(X, f64)], tolerance: Option<f64>) -> Result<Self> {
        match self {
            Self::Dynamic(a) => Ok(a.solve(xy_pairs, tolerance)?.into()),
            Self::Tabular(a) => Ok(a.solve(xy_pairs, tolerance)?.into()),
            Self::Linear(a) => Ok(a.solve(xy_pairs, tolerance)?.into()),
            Self::Dnn(a) => Ok(a.solve(xy_pairs, tolerance)?.into()),
        }
    }

    fn within(&self, other: &Self, tolerance: f64) -> bool {
        match (self, other) {
            (Self::Dynamic(a), Self::Dynamic(b)) => a.within(b, tolerance),
            (Self::Tabular(a), Self::Tabular(b)) => a.within(b, tolerance),
            (Self::Linear(a), Self::Linear(b)) => a.within(b, tolerance),
            (Self::Dnn(a), Self::Dnn(b)) => a.within(b, tolerance),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{feature, ConstantSchedule, LinearConfig};
    use std::collections::HashMap;

    fn table(value: f64) -> AnyApprox<u8> {
        Dynamic::from_values(HashMap::from([(0, value)])).into()
    }

    fn line() -> AnyApprox<u8> {
        let features = vec![feature(|_: &u8| 1.0), feature(|x: &u8| f64::from(*x))];
        LinearApprox::new(features, LinearConfig::default()).unwrap().into()
    }

    #[test]
    fn test_within_across_variants_is_false() {
        let dynamic = table(0.0);
        let tabular: AnyApprox<u8> = Tabular::<u8>::new().into();
        assert!(dynamic.within(&table(0.0), 0.0));
        assert!(!dynamic.within(&tabular, f64::INFINITY));
        assert!(!tabular.within(&line(), f64::INFINITY));
    }

    #[test]
    fn test_combine_across_variants_fails() {
        let result = table(1.0).combine(&line());
        assert_eq!(
            result.unwrap_err(),
            ApproxError::VariantMismatch {
                expected: "dynamic",
                actual: "linear",
            }
        );
        let sum = table(1.0).combine(&table(2.0)).unwrap();
        assert!(sum.within(&table(3.0), 1e-12));
    }

    #[test]
    fn test_foreign_gradient_rejected() {
        let data = [(1, 2.0), (2, 3.0)];
        let gradient = line()
            .objective_gradient(&data, |xs, _| Array1::ones(xs.len()))
            .unwrap();
        assert!(matches!(
            table(0.0).update_with_gradient(&gradient),
            Err(ApproxError::VariantMismatch { .. })
        ));
        assert!(line().update_with_gradient(&gradient).is_ok());
    }

    #[test]
    fn test_dispatch() {
        let data = [(1, 3.0), (2, 5.0), (3, 7.0)];
        let solved = line().solve(&data, None).unwrap();
        assert_eq!(solved.variant_name(), "linear");
        assert!((solved.value(&4) - 9.0).abs() < 1e-9);

        let tabular: AnyApprox<u8> = Tabular::<u8>::with_schedule(ConstantSchedule::new(1.0)).into();
        let updated = tabular.update(&[(5, 2.0)]).unwrap().update(&[(5, -1.0)]).unwrap();
        assert!((updated.value(&5) + 1.0).abs() < 1e-12);
        assert!((updated.scale(2.0).value(&5) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_update_and_zero_reach_the_tables() {
        let batch = [(1, 1.0), (1, 3.0)];
        let tabular: AnyApprox<u8> = Tabular::<u8>::new().into();
        let updated = tabular.update(&batch).unwrap();
        assert_eq!(updated.value(&1), 2.0);
        let AnyApprox::Tabular(inner) = updated.zero() else {
            panic!("zero changed the variant");
        };
        assert_eq!(inner.count(&1), 0);

        let overwritten = table(0.2).update(&[(0, -0.4)]).unwrap();
        assert_eq!(overwritten.value(&0), -0.4);
    }
}
