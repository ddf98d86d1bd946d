//! Activation functions for feed-forward networks
//!
//! Every derivative here is expressed in terms of the activation's *output*
//! `y = f(z)`, not its input: the network only keeps layer outputs around for
//! backpropagation. `sigmoid' = y (1 - y)`, `tanh' = 1 - y^2`, and so on.

use std::fmt;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Element-wise array map used by custom activations
pub type ArrayFn = Arc<dyn Fn(&Array2<f64>) -> Array2<f64> + Send + Sync>;

/// Caller-supplied activation and its derivative in terms of the output.
///
/// The two functions must agree; nothing checks that `derivative` really is
/// the derivative of `function`.
#[derive(Clone)]
pub struct CustomActivation {
    name: String,
    function: ArrayFn,
    derivative: ArrayFn,
}

impl fmt::Debug for CustomActivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomActivation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Network activation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// `f(z) = z`
    #[default]
    Identity,
    /// Logistic function
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
    /// `max(z, 0)`
    Relu,
    /// Caller-supplied pair; cannot be serialized
    #[serde(skip)]
    Custom(CustomActivation),
}

impl Activation {
    /// Wrap a caller-supplied activation and its derivative (taking the
    /// activation output, like the built-ins)
    pub fn custom<F, D>(name: impl Into<String>, function: F, derivative: D) -> Self
    where
        F: Fn(&Array2<f64>) -> Array2<f64> + Send + Sync + 'static,
        D: Fn(&Array2<f64>) -> Array2<f64> + Send + Sync + 'static,
    {
        Self::Custom(CustomActivation {
            name: name.into(),
            function: Arc::new(function),
            derivative: Arc::new(derivative),
        })
    }

    /// Name used in logs and configuration
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Identity => "identity",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Relu => "relu",
            Self::Custom(custom) => &custom.name,
        }
    }

    /// Activation of every pre-activation value in `z`
    #[must_use]
    pub fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::Identity => z.clone(),
            Self::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Self::Tanh => z.mapv(f64::tanh),
            Self::Relu => z.mapv(|v| v.max(0.0)),
            Self::Custom(custom) => (custom.function)(z),
        }
    }

    /// Derivative at every activation output in `y`
    #[must_use]
    pub fn derivative(&self, y: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::Identity => Array2::ones(y.raw_dim()),
            Self::Sigmoid => y.mapv(|v| v * (1.0 - v)),
            Self::Tanh => y.mapv(|v| 1.0 - v * v),
            Self::Relu => y.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Self::Custom(custom) => (custom.derivative)(y),
        }
    }
}
