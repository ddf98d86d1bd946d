//! Exact table storage, as in dynamic programming

use std::collections::HashMap;
use std::hash::Hash;

use ndarray::Array1;
use rl_approx_core::{objective_derivative, ApproxError, FunctionApprox, Gradient, Parameterized, Result};

/// Map from each input to its value, with no generalisation between inputs.
///
/// Each update for an input replaces its previous value altogether. Inputs
/// never stored evaluate to 0.
#[derive(Debug, Clone)]
pub struct Dynamic<X> {
    values_map: HashMap<X, f64>,
}

impl<X> Default for Dynamic<X> {
    fn default() -> Self {
        Self {
            values_map: HashMap::new(),
        }
    }
}

impl<X: Eq + Hash> Dynamic<X> {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding `values_map`
    #[must_use]
    pub fn from_values(values_map: HashMap<X, f64>) -> Self {
        Self { values_map }
    }

    /// Stored values
    #[must_use]
    pub fn values_map(&self) -> &HashMap<X, f64> {
        &self.values_map
    }
}

impl<X: Clone + Eq + Hash> Parameterized for Dynamic<X> {
    fn combine(&self, other: &Self) -> Result<Self> {
        let mut values_map = self.values_map.clone();
        for (key, value) in &other.values_map {
            *values_map.entry(key.clone()).or_insert(0.0) += value;
        }
        Ok(Self { values_map })
    }

    fn scale(&self, factor: f64) -> Self {
        Self {
            values_map: self
                .values_map
                .iter()
                .map(|(key, value)| (key.clone(), value * factor))
                .collect(),
        }
    }
}

impl<X: Clone + Eq + Hash> FunctionApprox<X> for Dynamic<X> {
    fn evaluate(&self, xs: &[X]) -> Array1<f64> {
        xs.iter()
            .map(|x| self.values_map.get(x).copied().unwrap_or(0.0))
            .collect()
    }

    fn objective_gradient<D>(&self, xy_pairs: &[(X, f64)], obj_deriv_out: D) -> Result<Gradient<Self>>
    where
        D: FnOnce(&[X], &[f64]) -> Array1<f64>,
    {
        let (xs, derivative) = objective_derivative(xy_pairs, obj_deriv_out)?;
        // a repeated input keeps its last derivative
        let values_map = xs.into_iter().zip(derivative.iter().copied()).collect();
        Ok(Gradient::new(Self { values_map }))
    }

    fn update_with_gradient(&self, gradient: &Gradient<Self>) -> Result<Self> {
        let mut values_map = self.values_map.clone();
        for (key, g) in &gradient.function_approx().values_map {
            *values_map.entry(key.clone()).or_insert(0.0) -= g;
        }
        Ok(Self { values_map })
    }

    /// Overwrite the value of every input in `xy_pairs` with its target
    /// exactly, later pairs winning.
    fn update(&self, xy_pairs: &[(X, f64)]) -> Result<Self> {
        if xy_pairs.is_empty() {
            return Err(ApproxError::empty("update over no examples"));
        }
        let mut values_map = self.values_map.clone();
        values_map.extend(xy_pairs.iter().cloned());
        Ok(Self { values_map })
    }

    /// Store every target, later pairs for the same input overriding earlier
    /// ones. This is already the fixed point of [`FunctionApprox::update`], so
    /// `tolerance` is unused.
    fn solve(&self, xy_pairs: &[(X, f64)], _tolerance: Option<f64>) -> Result<Self> {
        if xy_pairs.is_empty() {
            return Err(ApproxError::empty("solve over no examples"));
        }
        Ok(Self {
            values_map: xy_pairs.iter().cloned().collect(),
        })
    }

    fn within(&self, other: &Self, tolerance: f64) -> bool {
        within_tables(&self.values_map, &other.values_map, tolerance)
    }
}

/// Every key of either table within `tolerance`, absent keys reading as 0
pub(crate) fn within_tables<X: Eq + Hash>(a: &HashMap<X, f64>, b: &HashMap<X, f64>, tolerance: f64) -> bool {
    let close = |x: &HashMap<X, f64>, y: &HashMap<X, f64>| {
        x.iter()
            .all(|(key, value)| (value - y.get(key).copied().unwrap_or(0.0)).abs() <= tolerance)
    };
    close(a, b) && close(b, a)
}
