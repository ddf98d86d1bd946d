//! Tabular approximation with recency-weighted running means

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ndarray::Array1;
use rl_approx_core::{
    objective_derivative, ApproxError, FunctionApprox, Gradient, HarmonicSchedule, Parameterized,
    Result, Schedule,
};

use crate::dynamic::within_tables;

/// Approximates a function of a discrete domain without interpolation.
///
/// The value of each input is a weighted running mean of the targets seen for
/// it: the `n`-th target for an input is blended in with weight
/// `count_to_weight(n)`. The default harmonic schedule (`1/n`) gives the plain
/// sample mean; a constant weight of 1 behaves exactly like
/// [`Dynamic`](crate::Dynamic). Inputs never updated evaluate to 0.
#[derive(Debug, Clone)]
pub struct Tabular<X> {
    values_map: HashMap<X, f64>,
    counts_map: HashMap<X, usize>,
    count_to_weight: Arc<dyn Schedule>,
}

impl<X: Eq + Hash> Default for Tabular<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: Eq + Hash> Tabular<X> {
    /// Empty table weighting observations by `1/n`
    #[must_use]
    pub fn new() -> Self {
        Self::with_schedule(HarmonicSchedule)
    }

    /// Empty table using `count_to_weight` as its learning rate
    #[must_use]
    pub fn with_schedule(count_to_weight: impl Schedule + 'static) -> Self {
        Self {
            values_map: HashMap::new(),
            counts_map: HashMap::new(),
            count_to_weight: Arc::new(count_to_weight),
        }
    }

    /// Same schedule around explicit values and counts
    #[must_use]
    pub fn with_values(&self, values_map: HashMap<X, f64>, counts_map: HashMap<X, usize>) -> Self {
        Self {
            values_map,
            counts_map,
            count_to_weight: Arc::clone(&self.count_to_weight),
        }
    }

    /// Current values
    #[must_use]
    pub fn values_map(&self) -> &HashMap<X, f64> {
        &self.values_map
    }

    /// How many targets each input has absorbed
    #[must_use]
    pub fn counts_map(&self) -> &HashMap<X, usize> {
        &self.counts_map
    }

    /// Update count of a single input, 0 if never updated
    #[must_use]
    pub fn count(&self, x: &X) -> usize {
        self.counts_map.get(x).copied().unwrap_or(0)
    }

    /// Weight given to the `n`-th target of an input
    #[must_use]
    pub fn weight(&self, n: usize) -> f64 {
        self.count_to_weight.value(n)
    }
}

impl<X: Clone + Eq + Hash> Tabular<X> {
    /// Blend each target in, pair by pair, with the weight for its input's
    /// running count
    fn fold(
        &self,
        mut values_map: HashMap<X, f64>,
        mut counts_map: HashMap<X, usize>,
        xy_pairs: &[(X, f64)],
    ) -> Self {
        for (x, y) in xy_pairs {
            let count = counts_map.entry(x.clone()).or_insert(0);
            *count += 1;
            let weight = self.count_to_weight.value(*count);
            let value = values_map.entry(x.clone()).or_insert(0.0);
            *value = weight * y + (1.0 - weight) * *value;
        }
        self.with_values(values_map, counts_map)
    }
}

impl<X: Clone + Eq + Hash> Parameterized for Tabular<X> {
    fn combine(&self, other: &Self) -> Result<Self> {
        let mut values_map = self.values_map.clone();
        let mut counts_map = self.counts_map.clone();
        for (key, value) in &other.values_map {
            *values_map.entry(key.clone()).or_insert(0.0) += value;
        }
        for (key, count) in &other.counts_map {
            *counts_map.entry(key.clone()).or_insert(0) += count;
        }
        Ok(self.with_values(values_map, counts_map))
    }

    fn scale(&self, factor: f64) -> Self {
        let values_map = self
            .values_map
            .iter()
            .map(|(key, value)| (key.clone(), value * factor))
            .collect();
        self.with_values(values_map, self.counts_map.clone())
    }

    /// Empty tables, so combining it leaves counts as well as values alone
    fn zero(&self) -> Self {
        self.with_values(HashMap::new(), HashMap::new())
    }
}

impl<X: Clone + Eq + Hash> FunctionApprox<X> for Tabular<X> {
    fn evaluate(&self, xs: &[X]) -> Array1<f64> {
        xs.iter()
            .map(|x| self.values_map.get(x).copied().unwrap_or(0.0))
            .collect()
    }

    /// The gradient holds, per input, the mean derivative over the examples
    /// for that input, and in its counts how many examples there were.
    #[allow(clippy::cast_precision_loss)]
    fn objective_gradient<D>(&self, xy_pairs: &[(X, f64)], obj_deriv_out: D) -> Result<Gradient<Self>>
    where
        D: FnOnce(&[X], &[f64]) -> Array1<f64>,
    {
        let (xs, derivative) = objective_derivative(xy_pairs, obj_deriv_out)?;
        let mut sums_map: HashMap<X, f64> = HashMap::new();
        let mut counts_map: HashMap<X, usize> = HashMap::new();
        for (x, d) in xs.into_iter().zip(derivative.iter()) {
            *sums_map.entry(x.clone()).or_insert(0.0) += d;
            *counts_map.entry(x).or_insert(0) += 1;
        }
        let values_map = sums_map
            .into_iter()
            .map(|(x, sum)| {
                let n = counts_map.get(&x).copied().unwrap_or(1);
                (x, sum / n as f64)
            })
            .collect();
        Ok(Gradient::new(self.with_values(values_map, counts_map)))
    }

    /// Adds the gradient's counts to this table's, then moves each value
    /// against its mean derivative by the weight for the new count.
    fn update_with_gradient(&self, gradient: &Gradient<Self>) -> Result<Self> {
        let gradient = gradient.function_approx();
        let mut values_map = self.values_map.clone();
        let mut counts_map = self.counts_map.clone();
        for (key, g) in &gradient.values_map {
            let count = counts_map.entry(key.clone()).or_insert(0);
            *count += gradient.counts_map.get(key).copied().unwrap_or(0);
            let weight = self.count_to_weight.value(*count);
            *values_map.entry(key.clone()).or_insert(0.0) -= weight * g;
        }
        Ok(self.with_values(values_map, counts_map))
    }

    /// Fold the pairs in order into this table, one count per pair, so a
    /// batch lands exactly where the same pairs applied one at a time would.
    fn update(&self, xy_pairs: &[(X, f64)]) -> Result<Self> {
        if xy_pairs.is_empty() {
            return Err(ApproxError::empty("update over no examples"));
        }
        Ok(self.fold(self.values_map.clone(), self.counts_map.clone(), xy_pairs))
    }

    /// Same fold as [`FunctionApprox::update`], starting from fresh tables.
    /// The result is exact, so `tolerance` is unused.
    fn solve(&self, xy_pairs: &[(X, f64)], _tolerance: Option<f64>) -> Result<Self> {
        if xy_pairs.is_empty() {
            return Err(ApproxError::empty("solve over no examples"));
        }
        Ok(self.fold(HashMap::new(), HashMap::new(), xy_pairs))
    }

    fn within(&self, other: &Self, tolerance: f64) -> bool {
        within_tables(&self.values_map, &other.values_map, tolerance)
    }
}
