//! Core function-approximation traits and types
//!
//! This crate provides the variant-independent pieces of value-function
//! approximation for reinforcement learning: the [`FunctionApprox`]
//! interface, gradients shaped like the approximators they belong to, Adam
//! optimizer state, update-count schedules, and the lazy iteration utilities
//! that drive repeated updates to convergence.
//!
//! Everything here is single-threaded and synchronous. Approximators,
//! gradients and weights are immutable values; every update returns a new
//! one.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod function_approx;
pub mod gradient;
pub mod iterate;
pub mod schedule;
pub mod weights;

// Re-export core traits and types
pub use error::{ApproxError, Result};
pub use function_approx::{
    objective_derivative, solve_by_convergence, FunctionApprox, DEFAULT_TOLERANCE,
};
pub use gradient::{apply_as_update, combine_gradients, Gradient, Parameterized};
pub use iterate::{accumulate, converge, converged, iterate, last, ConvergeExt};
pub use schedule::{ConstantSchedule, HarmonicSchedule, LearningRateSchedule, Schedule};
pub use weights::{AdamConfig, Weights, SMALL_NUM};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AdamConfig, ApproxError, ConvergeExt, FunctionApprox, Gradient, Parameterized, Result,
        Schedule, Weights,
    };
}
