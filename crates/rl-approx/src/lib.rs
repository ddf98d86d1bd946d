//! Value-function approximators for reinforcement learning
//!
//! Four interchangeable implementations of [`FunctionApprox`]:
//!
//! - [`Dynamic`]: an exact lookup table, as used by dynamic programming
//! - [`Tabular`]: a table of count-weighted running means
//! - [`LinearApprox`]: a linear model over feature functions, solved by
//!   regularised least squares or by Adam gradient descent
//! - [`DnnApprox`]: a feed-forward network trained by backpropagation
//!
//! [`AnyApprox`] wraps whichever one is picked at run time. The traits and
//! shared types live in [`rl_approx_core`] and are re-exported here.
//!
//! # Example
//!
//! ```
//! use rl_approx::prelude::*;
//! use rl_approx::{feature, LinearApprox, LinearConfig};
//!
//! let features = vec![feature(|_: &f64| 1.0), feature(|x: &f64| *x)];
//! let lfa = LinearApprox::new(features, LinearConfig::default())?;
//! let fitted = lfa.solve(&[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)], None)?;
//! assert!((fitted.value(&3.0) - 7.0).abs() < 1e-9);
//! # Ok::<(), rl_approx::ApproxError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod activation;
pub mod any;
pub mod dnn;
pub mod dynamic;
pub mod features;
pub mod linear;
pub mod tabular;

pub use activation::{Activation, ArrayFn, CustomActivation};
pub use any::AnyApprox;
pub use dnn::{DnnApprox, DnnConfig, DnnSpec, ForwardPass};
pub use dynamic::Dynamic;
pub use features::{feature, feature_matrix, FeatureFn};
pub use linear::{LinearApprox, LinearConfig};
pub use tabular::Tabular;

// Re-export the core so callers need a single dependency
pub use rl_approx_core::{
    accumulate, apply_as_update, combine_gradients, converge, converged, iterate, last,
    objective_derivative, solve_by_convergence, AdamConfig, ApproxError, ConstantSchedule,
    ConvergeExt, FunctionApprox, Gradient, HarmonicSchedule, LearningRateSchedule, Parameterized,
    Result, Schedule, Weights, DEFAULT_TOLERANCE, SMALL_NUM,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use rl_approx_core::prelude::*;

    pub use crate::{AnyApprox, DnnApprox, Dynamic, LinearApprox, Tabular};
}
