//! Linear-in-features approximation

use std::fmt;

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use rl_approx_core::{
    objective_derivative, solve_by_convergence, AdamConfig, ApproxError, FunctionApprox, Gradient,
    Parameterized, Result, Weights,
};
use serde::{Deserialize, Serialize};

use crate::features::{feature_matrix, FeatureFn};

/// Hyperparameters of a [`LinearApprox`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    /// Optimizer used by incremental updates
    pub adam: AdamConfig,
    /// L2 penalty on the weights
    pub regularization_coefficient: f64,
    /// Solve with the normal equations instead of gradient descent
    pub direct_solve: bool,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            adam: AdamConfig::default(),
            regularization_coefficient: 0.0,
            direct_solve: true,
        }
    }
}

impl LinearConfig {
    /// Check every hyperparameter
    ///
    /// # Errors
    ///
    /// [`ApproxError::InvalidConfig`] if a value is out of range.
    pub fn validate(&self) -> Result<()> {
        self.adam.validate()?;
        validate_regularization(self.regularization_coefficient)
    }

    /// Parse and validate a JSON configuration; missing fields take defaults
    ///
    /// # Errors
    ///
    /// [`ApproxError::InvalidConfig`] on malformed JSON or out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn validate_regularization(coefficient: f64) -> Result<()> {
    if coefficient.is_finite() && coefficient >= 0.0 {
        Ok(())
    } else {
        Err(ApproxError::InvalidConfig(format!(
            "regularization_coefficient must be non-negative, got {coefficient}"
        )))
    }
}

/// `f(x) = sum_j w_j * phi_j(x)` over caller-supplied feature functions `phi`
pub struct LinearApprox<X> {
    feature_functions: Vec<FeatureFn<X>>,
    regularization_coefficient: f64,
    weights: Weights,
    direct_solve: bool,
}

impl<X> Clone for LinearApprox<X> {
    fn clone(&self) -> Self {
        Self {
            feature_functions: self.feature_functions.clone(),
            regularization_coefficient: self.regularization_coefficient,
            weights: self.weights.clone(),
            direct_solve: self.direct_solve,
        }
    }
}

impl<X> fmt::Debug for LinearApprox<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearApprox")
            .field("features", &self.feature_functions.len())
            .field("regularization_coefficient", &self.regularization_coefficient)
            .field("weights", &self.weights)
            .field("direct_solve", &self.direct_solve)
            .finish()
    }
}

impl<X> LinearApprox<X> {
    /// Zero weights over `feature_functions`
    ///
    /// # Errors
    ///
    /// [`ApproxError::InvalidConfig`] if `config` does not validate.
    pub fn new(feature_functions: Vec<FeatureFn<X>>, config: LinearConfig) -> Result<Self> {
        config.validate()?;
        let weights = Weights::create(config.adam, Array1::zeros(feature_functions.len()));
        Ok(Self {
            feature_functions,
            regularization_coefficient: config.regularization_coefficient,
            weights,
            direct_solve: config.direct_solve,
        })
    }

    /// Same approximator around explicit weights
    ///
    /// # Errors
    ///
    /// [`ApproxError::ShapeMismatch`] unless there is one weight per feature.
    pub fn with_weights(&self, weights: Weights) -> Result<Self> {
        let expected = [self.feature_functions.len()];
        if weights.parameters().shape() != expected {
            return Err(ApproxError::shape(&expected, weights.parameters().shape()));
        }
        Ok(Self {
            weights,
            ..self.clone()
        })
    }

    /// Current weights and optimizer state
    #[must_use]
    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Feature functions, in weight order
    #[must_use]
    pub fn feature_functions(&self) -> &[FeatureFn<X>] {
        &self.feature_functions
    }

    /// L2 penalty on the weights
    #[must_use]
    pub fn regularization_coefficient(&self) -> f64 {
        self.regularization_coefficient
    }

    /// Whether `solve` uses the normal equations
    #[must_use]
    pub fn direct_solve(&self) -> bool {
        self.direct_solve
    }

    /// `n x k` feature matrix of `xs`
    #[must_use]
    pub fn feature_values(&self, xs: &[X]) -> Array2<f64> {
        feature_matrix(&self.feature_functions, xs)
    }

    fn with_parameters(&self, parameters: Array1<f64>) -> Result<Self> {
        Ok(Self {
            weights: self.weights.with_parameters(parameters)?,
            ..self.clone()
        })
    }
}

impl<X: Clone> LinearApprox<X> {
    /// Regularised least squares `(Phi^T Phi + n lambda I)^-1 Phi^T y`.
    ///
    /// The optimizer state starts over around the solution.
    ///
    /// # Errors
    ///
    /// [`ApproxError::EmptyInput`] if `xy_pairs` is empty,
    /// [`ApproxError::Unsolvable`] if the system is singular.
    #[allow(clippy::cast_precision_loss)]
    pub fn solve_directly(&self, xy_pairs: &[(X, f64)]) -> Result<Self> {
        if xy_pairs.is_empty() {
            return Err(ApproxError::empty("solve over no examples"));
        }
        let (xs, ys): (Vec<X>, Vec<f64>) = xy_pairs.iter().cloned().unzip();
        let features = self.feature_values(&xs);
        let (n, k) = features.dim();

        let left = features.t().dot(&features)
            + Array2::<f64>::eye(k) * (n as f64 * self.regularization_coefficient);
        let right = features.t().dot(&Array1::from(ys));

        let a = DMatrix::from_fn(k, k, |i, j| left[[i, j]]);
        let b = DVector::from_iterator(k, right.iter().copied());
        let Some(solution) = a
            .lu()
            .solve(&b)
            .filter(|solution| solution.iter().all(|w| w.is_finite()))
        else {
            tracing::warn!(examples = n, features = k, "normal equations are singular");
            return Err(ApproxError::Unsolvable(format!(
                "singular normal equations for {k} features over {n} examples"
            )));
        };

        tracing::debug!(examples = n, features = k, "direct solve complete");
        let parameters: Array1<f64> = solution.iter().copied().collect();
        Ok(Self {
            weights: Weights::create(*self.weights.adam(), parameters),
            ..self.clone()
        })
    }
}

impl<X: Clone> Parameterized for LinearApprox<X> {
    fn combine(&self, other: &Self) -> Result<Self> {
        if other.weights.parameters().len() != self.weights.parameters().len() {
            return Err(ApproxError::shape(
                self.weights.parameters().shape(),
                other.weights.parameters().shape(),
            ));
        }
        self.with_parameters(self.weights.parameters() + other.weights.parameters())
    }

    fn scale(&self, factor: f64) -> Self {
        Self {
            weights: self.weights.map_parameters(|w| w * factor),
            ..self.clone()
        }
    }
}

impl<X: Clone> FunctionApprox<X> for LinearApprox<X> {
    fn evaluate(&self, xs: &[X]) -> Array1<f64> {
        self.feature_values(xs).dot(self.weights.parameters())
    }

    /// `Phi^T d / n + lambda w`
    #[allow(clippy::cast_precision_loss)]
    fn objective_gradient<D>(&self, xy_pairs: &[(X, f64)], obj_deriv_out: D) -> Result<Gradient<Self>>
    where
        D: FnOnce(&[X], &[f64]) -> Array1<f64>,
    {
        let (xs, derivative) = objective_derivative(xy_pairs, obj_deriv_out)?;
        let features = self.feature_values(&xs);
        let gradient = features.t().dot(&derivative) / xs.len() as f64
            + self.weights.parameters() * self.regularization_coefficient;
        Ok(Gradient::new(self.with_parameters(gradient)?))
    }

    fn update_with_gradient(&self, gradient: &Gradient<Self>) -> Result<Self> {
        Ok(Self {
            weights: self
                .weights
                .update(gradient.function_approx().weights.parameters())?,
            ..self.clone()
        })
    }

    /// Direct solve when configured, otherwise gradient descent until two
    /// successive approximators are within `tolerance`. The iterative path
    /// has no iteration cap and never returns if the updates do not settle.
    fn solve(&self, xy_pairs: &[(X, f64)], tolerance: Option<f64>) -> Result<Self> {
        if self.direct_solve {
            self.solve_directly(xy_pairs)
        } else {
            solve_by_convergence(self, xy_pairs, tolerance)
        }
    }

    fn within(&self, other: &Self, tolerance: f64) -> bool {
        self.weights.within(&other.weights, tolerance)
    }
}
