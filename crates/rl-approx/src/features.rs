//! Feature functions and feature matrices

use std::sync::Arc;

use ndarray::Array2;

/// Caller-supplied map from a domain value to one real-valued feature
pub type FeatureFn<X> = Arc<dyn Fn(&X) -> f64 + Send + Sync>;

/// Wrap a closure as a [`FeatureFn`]
pub fn feature<X, F>(f: F) -> FeatureFn<X>
where
    F: Fn(&X) -> f64 + Send + Sync + 'static,
{
    Arc::new(f)
}

/// `n x k` matrix holding `feature_functions[j](xs[i])` at `(i, j)`
pub fn feature_matrix<X>(feature_functions: &[FeatureFn<X>], xs: &[X]) -> Array2<f64> {
    Array2::from_shape_fn((xs.len(), feature_functions.len()), |(i, j)| {
        feature_functions[j](&xs[i])
    })
}
