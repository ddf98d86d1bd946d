//! Parameter arrays with their Adam optimizer state

use ndarray::{Array, Dimension, Ix1, Zip};
use serde::{Deserialize, Serialize};

use crate::{ApproxError, Result};

/// Added to the root of the second moment so a zero moment never divides
pub const SMALL_NUM: f64 = 1e-6;

/// Adam hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    /// Step size
    pub learning_rate: f64,
    /// Decay of the first moment estimate, in (0, 1)
    pub decay1: f64,
    /// Decay of the second moment estimate, in (0, 1)
    pub decay2: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            decay1: 0.9,
            decay2: 0.999,
        }
    }
}

impl AdamConfig {
    /// Create a validated configuration
    ///
    /// # Errors
    ///
    /// [`ApproxError::InvalidConfig`] if a value is out of range.
    pub fn new(learning_rate: f64, decay1: f64, decay2: f64) -> Result<Self> {
        let config = Self {
            learning_rate,
            decay1,
            decay2,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the learning rate is positive and both decays lie in (0, 1)
    ///
    /// # Errors
    ///
    /// [`ApproxError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ApproxError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, decay) in [("decay1", self.decay1), ("decay2", self.decay2)] {
            if !(decay > 0.0 && decay < 1.0) {
                return Err(ApproxError::InvalidConfig(format!(
                    "{name} must lie in (0, 1), got {decay}"
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
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

/// One parameter array plus the Adam moments that drive its updates.
///
/// `Weights` is a value: [`Weights::update`] returns a new instance and leaves
/// the receiver untouched. The moments always share the shape of the
/// parameters and `step` counts the updates applied so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights<D: Dimension = Ix1> {
    adam: AdamConfig,
    step: usize,
    parameters: Array<f64, D>,
    moment1: Array<f64, D>,
    moment2: Array<f64, D>,
}

impl<D: Dimension> Weights<D> {
    /// Wrap `parameters` with zeroed moments and a zero step counter
    #[must_use]
    pub fn create(adam: AdamConfig, parameters: Array<f64, D>) -> Self {
        let moment1 = Array::zeros(parameters.raw_dim());
        let moment2 = Array::zeros(parameters.raw_dim());
        Self {
            adam,
            step: 0,
            parameters,
            moment1,
            moment2,
        }
    }

    /// Wrap `parameters` with explicit moment estimates
    ///
    /// # Errors
    ///
    /// [`ApproxError::ShapeMismatch`] if a moment is not shaped like the
    /// parameters.
    pub fn with_moments(
        adam: AdamConfig,
        parameters: Array<f64, D>,
        moment1: Array<f64, D>,
        moment2: Array<f64, D>,
    ) -> Result<Self> {
        for moment in [&moment1, &moment2] {
            if moment.shape() != parameters.shape() {
                return Err(ApproxError::shape(parameters.shape(), moment.shape()));
            }
        }
        Ok(Self {
            adam,
            step: 0,
            parameters,
            moment1,
            moment2,
        })
    }

    /// Hyperparameters driving this array
    #[must_use]
    pub fn adam(&self) -> &AdamConfig {
        &self.adam
    }

    /// Number of updates applied
    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Current parameter values
    #[must_use]
    pub fn parameters(&self) -> &Array<f64, D> {
        &self.parameters
    }

    /// First raw-gradient moment estimate
    #[must_use]
    pub fn moment1(&self) -> &Array<f64, D> {
        &self.moment1
    }

    /// Second raw-gradient moment estimate
    #[must_use]
    pub fn moment2(&self) -> &Array<f64, D> {
        &self.moment2
    }

    /// Same optimizer state around different parameter values.
    ///
    /// Gradients and sums of approximators reuse the optimizer state of the
    /// receiver this way.
    ///
    /// # Errors
    ///
    /// [`ApproxError::ShapeMismatch`] if `parameters` has another shape.
    pub fn with_parameters(&self, parameters: Array<f64, D>) -> Result<Self> {
        if parameters.shape() != self.parameters.shape() {
            return Err(ApproxError::shape(self.parameters.shape(), parameters.shape()));
        }
        Ok(Self {
            parameters,
            ..self.clone()
        })
    }

    /// Same optimizer state around `f` applied to every parameter
    #[must_use]
    pub fn map_parameters<F: FnMut(f64) -> f64>(&self, f: F) -> Self {
        Self {
            parameters: self.parameters.mapv(f),
            ..self.clone()
        }
    }

    /// Bias-correction denominators `(1 - decay1^step, 1 - decay2^step)`.
    ///
    /// Both are zero before the first update and approach 1 as `step` grows.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bias_correction(&self) -> (f64, f64) {
        let t = self.step as f64;
        (1.0 - self.adam.decay1.powf(t), 1.0 - self.adam.decay2.powf(t))
    }

    /// Apply one Adam step for `gradient` and return the resulting weights
    ///
    /// # Errors
    ///
    /// [`ApproxError::ShapeMismatch`] if `gradient` is not shaped like the
    /// parameters.
    pub fn update(&self, gradient: &Array<f64, D>) -> Result<Self> {
        if gradient.shape() != self.parameters.shape() {
            return Err(ApproxError::shape(self.parameters.shape(), gradient.shape()));
        }
        let AdamConfig {
            learning_rate,
            decay1,
            decay2,
        } = self.adam;

        let step = self.step + 1;
        let moment1 = &self.moment1 * decay1 + gradient * (1.0 - decay1);
        let moment2 = &self.moment2 * decay2 + gradient.mapv(|g| g * g) * (1.0 - decay2);

        let next = Self {
            step,
            ..self.clone()
        };
        let (correction1, correction2) = next.bias_correction();

        let mut parameters = self.parameters.clone();
        Zip::from(&mut parameters)
            .and(&moment1)
            .and(&moment2)
            .for_each(|w, &m, &v| {
                let m_hat = m / correction1;
                let v_hat = v / correction2;
                *w -= learning_rate * m_hat / (v_hat.sqrt() + SMALL_NUM);
            });

        tracing::trace!(step, "adam update");

        Ok(Self {
            parameters,
            moment1,
            moment2,
            ..next
        })
    }

    /// True if every parameter is within `tolerance` of the matching one in
    /// `other`; arrays of different shapes are never within tolerance.
    #[must_use]
    pub fn within(&self, other: &Self, tolerance: f64) -> bool {
        self.parameters.shape() == other.parameters.shape()
            && Zip::from(&self.parameters)
                .and(&other.parameters)
                .all(|&a, &b| (a - b).abs() <= tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2, Array1};
    use proptest::prelude::*;

    #[test]
    fn test_default_settings() {
        let adam = AdamConfig::default();
        assert_abs_diff_eq!(adam.learning_rate, 0.001);
        assert_abs_diff_eq!(adam.decay1, 0.9);
        assert_abs_diff_eq!(adam.decay2, 0.999);
        assert!(adam.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(AdamConfig::new(0.1, 0.9, 0.999).is_ok());
        assert!(matches!(
            AdamConfig::new(0.1, 1.0, 0.999),
            Err(ApproxError::InvalidConfig(_))
        ));
        assert!(AdamConfig::new(0.1, 0.9, 0.0).is_err());
        assert!(AdamConfig::new(-0.1, 0.9, 0.999).is_err());
    }

    #[test]
    fn test_config_from_json() {
        let adam = AdamConfig::from_json(r#"{"learning_rate": 0.5, "decay1": 0.8, "decay2": 0.99}"#).unwrap();
        assert_abs_diff_eq!(adam.learning_rate, 0.5);
        assert_abs_diff_eq!(adam.decay1, 0.8);

        assert!(matches!(
            AdamConfig::from_json(r#"{"learning_rate": 0.5}"#),
            Err(ApproxError::InvalidConfig(_))
        ));
        assert!(AdamConfig::from_json(r#"{"learning_rate": 0.5, "decay1": 2.0, "decay2": 0.99}"#).is_err());
    }

    #[test]
    fn test_first_update_matches_recurrence() {
        let adam = AdamConfig::new(0.1, 0.9, 0.999).unwrap();
        let weights = Weights::create(adam, arr1(&[1.0, -2.0]));
        let gradient = arr1(&[0.5, -4.0]);

        let updated = weights.update(&gradient).unwrap();

        assert_eq!(updated.step(), 1);
        assert_abs_diff_eq!(updated.moment1()[0], 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(updated.moment2()[1], 0.016, epsilon = 1e-12);
        // after bias correction the first step is lr * g / (|g| + eps)
        let expected0 = 1.0 - 0.1 * 0.5 / (0.5 + SMALL_NUM);
        let expected1 = -2.0 + 0.1 * 4.0 / (4.0 + SMALL_NUM);
        assert_abs_diff_eq!(updated.parameters()[0], expected0, epsilon = 1e-12);
        assert_abs_diff_eq!(updated.parameters()[1], expected1, epsilon = 1e-12);
        // receiver is untouched
        assert_eq!(weights.step(), 0);
        assert_abs_diff_eq!(weights.parameters()[0], 1.0);
    }

    #[test]
    fn test_second_update_uses_accumulated_moments() {
        let adam = AdamConfig::new(0.01, 0.9, 0.999).unwrap();
        let weights = Weights::create(adam, arr1(&[0.0]));
        let g1 = arr1(&[1.0]);
        let g2 = arr1(&[3.0]);

        let updated = weights.update(&g1).unwrap().update(&g2).unwrap();

        let m = 0.9 * 0.1 + 0.1 * 3.0;
        let v = 0.999 * 0.001 + 0.001 * 9.0;
        let m_hat = m / (1.0 - 0.9f64.powi(2));
        let v_hat = v / (1.0 - 0.999f64.powi(2));
        let first = -0.01 * 1.0 / (1.0 + SMALL_NUM);
        let expected = first - 0.01 * m_hat / (v_hat.sqrt() + SMALL_NUM);
        assert_abs_diff_eq!(updated.moment1()[0], m, epsilon = 1e-12);
        assert_abs_diff_eq!(updated.moment2()[0], v, epsilon = 1e-12);
        assert_abs_diff_eq!(updated.parameters()[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_update_matrix_parameters() {
        let weights = Weights::create(AdamConfig::default(), arr2(&[[1.0, 2.0], [3.0, 4.0]]));
        let updated = weights.update(&arr2(&[[1.0, 0.0], [0.0, -1.0]])).unwrap();
        assert!(updated.parameters()[[0, 0]] < 1.0);
        assert_abs_diff_eq!(updated.parameters()[[0, 1]], 2.0);
        assert!(updated.parameters()[[1, 1]] > 4.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let weights = Weights::create(AdamConfig::default(), Array1::zeros(3));
        assert!(matches!(
            weights.update(&Array1::zeros(2)),
            Err(ApproxError::ShapeMismatch { .. })
        ));
        assert!(weights.with_parameters(Array1::zeros(4)).is_err());
        assert!(Weights::with_moments(AdamConfig::default(), Array1::zeros(3), Array1::zeros(3), Array1::zeros(1)).is_err());
    }

    #[test]
    fn test_within() {
        let a = Weights::create(AdamConfig::default(), arr1(&[1.0, 2.0]));
        let b = Weights::create(AdamConfig::default(), arr1(&[1.05, 1.98]));
        let c = Weights::create(AdamConfig::default(), arr1(&[1.0, 2.0, 3.0]));
        assert!(a.within(&b, 0.06));
        assert!(!a.within(&b, 0.01));
        assert!(!a.within(&c, 10.0));
    }

    #[test]
    fn test_map_parameters_keeps_optimizer_state() {
        let weights = Weights::create(AdamConfig::default(), arr1(&[1.0, -2.0]))
            .update(&arr1(&[0.5, 0.5]))
            .unwrap();
        let scaled = weights.map_parameters(|w| w * 3.0);
        assert_eq!(scaled.step(), 1);
        assert_eq!(scaled.moment1(), weights.moment1());
        assert_eq!(scaled.parameters(), &weights.parameters().mapv(|w| w * 3.0));
    }

    #[test]
    fn test_bias_correction_before_first_step() {
        let weights = Weights::create(AdamConfig::default(), arr1(&[0.0]));
        assert_eq!(weights.bias_correction(), (0.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_step_counts_updates(n in 1usize..60, g in -5.0f64..5.0) {
            let mut weights = Weights::create(AdamConfig::default(), arr1(&[0.0, 1.0]));
            let mut previous = weights.bias_correction();
            for _ in 0..n {
                weights = weights.update(&arr1(&[g, -g])).unwrap();
                let correction = weights.bias_correction();
                prop_assert!(correction.0 > previous.0 && correction.0 <= 1.0);
                prop_assert!(correction.1 > previous.1 && correction.1 <= 1.0);
                previous = correction;
            }
            prop_assert_eq!(weights.step(), n);
        }
    }
}
