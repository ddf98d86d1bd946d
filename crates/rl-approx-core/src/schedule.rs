//! Update-count schedules
//!
//! A schedule maps the number of times something has been updated to the
//! weight given to the newest observation. Tabular approximators use one as
//! their count-to-weight function.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Weight as a function of the (1-based) update count
pub trait Schedule: Send + Sync {
    /// Weight at update count `n`
    fn value(&self, n: usize) -> f64;
}

impl<F> Schedule for F
where
    F: Fn(usize) -> f64 + Send + Sync,
{
    fn value(&self, n: usize) -> f64 {
        self(n)
    }
}

/// `1 / n`: every observation counts equally, giving the sample mean
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HarmonicSchedule;

impl Schedule for HarmonicSchedule {
    #[allow(clippy::cast_precision_loss)]
    fn value(&self, n: usize) -> f64 {
        1.0 / n.max(1) as f64
    }
}

/// Same weight at every count; a weight of 1 overwrites on each update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantSchedule {
    /// Constant value
    pub value: f64,
}

impl ConstantSchedule {
    /// Create a constant schedule
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Schedule for ConstantSchedule {
    fn value(&self, _n: usize) -> f64 {
        self.value
    }
}

/// Polynomially decaying learning rate
///
/// `initial_learning_rate * (1 + (n - 1) / half_life) ^ -exponent`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningRateSchedule {
    /// Rate at the first update
    pub initial_learning_rate: f64,
    /// Count scale over which the rate decays
    pub half_life: f64,
    /// Decay exponent
    pub exponent: f64,
}

impl LearningRateSchedule {
    /// Create a learning-rate schedule
    #[must_use]
    pub fn new(initial_learning_rate: f64, half_life: f64, exponent: f64) -> Self {
        Self {
            initial_learning_rate,
            half_life,
            exponent,
        }
    }
}

impl Schedule for LearningRateSchedule {
    #[allow(clippy::cast_precision_loss)]
    fn value(&self, n: usize) -> f64 {
        let n = n.saturating_sub(1) as f64;
        self.initial_learning_rate * (1.0 + n / self.half_life).powf(-self.exponent)
    }
}

impl fmt::Debug for dyn Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field("first", &self.value(1))
            .finish_non_exhaustive()
    }
}
