//! Error types for the function-approximation core

use thiserror::Error;

/// Core error type for approximation operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApproxError {
    /// An operation that needs at least one element received none
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// The normal equations of a direct solve have no unique solution
    #[error("Numerically unsolvable: {0}")]
    Unsolvable(String),

    /// Array shapes do not line up
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape the operation required
        expected: Vec<usize>,
        /// Shape it was given
        actual: Vec<usize>,
    },

    /// Two approximators of different kinds were combined
    #[error("Variant mismatch: expected {expected}, got {actual}")]
    VariantMismatch {
        /// Variant of the receiver
        expected: &'static str,
        /// Variant of the argument
        actual: &'static str,
    },

    /// Hyperparameters out of range or unreadable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApproxError {
    /// Shorthand for an [`ApproxError::EmptyInput`] error
    pub fn empty(what: impl Into<String>) -> Self {
        Self::EmptyInput(what.into())
    }

    /// Shorthand for an [`ApproxError::ShapeMismatch`] error
    pub fn shape(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

impl From<serde_json::Error> for ApproxError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Result type alias for approximation operations
pub type Result<T> = std::result::Result<T, ApproxError>;
