//! Feed-forward neural network approximation with hand-written backpropagation

use std::fmt;

use ndarray::{s, Array1, Array2, Axis, Ix2};
use rand::Rng;
use rand_distr::StandardNormal;
use rl_approx_core::{
    objective_derivative, AdamConfig, ApproxError, FunctionApprox, Gradient, Parameterized, Result,
    Weights,
};
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::features::{feature_matrix, FeatureFn};
use crate::linear::validate_regularization;

/// Network shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnnSpec {
    /// Width of each hidden layer, input side first
    pub neurons: Vec<usize>,
    /// Append a constant 1 unit to every hidden layer's output
    pub bias: bool,
    /// Activation of the hidden layers
    pub hidden_activation: Activation,
    /// Activation of the single output unit
    pub output_activation: Activation,
}

impl DnnSpec {
    /// `(outputs, inputs)` of every layer's weight matrix for `num_features`
    /// input features, input layer first, output layer last
    #[must_use]
    pub fn layer_shapes(&self, num_features: usize) -> Vec<(usize, usize)> {
        let extra = usize::from(self.bias);
        let inputs = std::iter::once(num_features).chain(self.neurons.iter().map(|n| n + extra));
        let outputs = self.neurons.iter().copied().chain(std::iter::once(1));
        outputs.zip(inputs).collect()
    }

    /// Check that no hidden layer is empty
    ///
    /// # Errors
    ///
    /// [`ApproxError::InvalidConfig`] naming the first empty layer.
    pub fn validate(&self) -> Result<()> {
        match self.neurons.iter().position(|&n| n == 0) {
            Some(layer) => Err(ApproxError::InvalidConfig(format!(
                "hidden layer {layer} has no neurons"
            ))),
            None => Ok(()),
        }
    }
}

/// Training hyperparameters of a [`DnnApprox`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnnConfig {
    /// Optimizer shared by every layer (each layer keeps its own state)
    pub adam: AdamConfig,
    /// L2 penalty on every layer's weights
    pub regularization_coefficient: f64,
}

impl DnnConfig {
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

/// Everything a forward pass computes that backpropagation needs
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// Input of each layer, one row per example, bias column included
    pub layer_inputs: Vec<Array2<f64>>,
    /// Network output, one per example
    pub output: Array1<f64>,
}

/// Multi-layer perceptron over caller-supplied feature functions.
///
/// Layer `i` holds a `[outputs x inputs]` weight matrix with its own Adam
/// state. With [`DnnSpec::bias`] set, each hidden layer's output gets a
/// constant 1 prepended as column 0 before it feeds the next layer.
pub struct DnnApprox<X> {
    feature_functions: Vec<FeatureFn<X>>,
    dnn_spec: DnnSpec,
    regularization_coefficient: f64,
    weights: Vec<Weights<Ix2>>,
}

impl<X> Clone for DnnApprox<X> {
    fn clone(&self) -> Self {
        Self {
            feature_functions: self.feature_functions.clone(),
            dnn_spec: self.dnn_spec.clone(),
            regularization_coefficient: self.regularization_coefficient,
            weights: self.weights.clone(),
        }
    }
}

impl<X> fmt::Debug for DnnApprox<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnnApprox")
            .field("features", &self.feature_functions.len())
            .field("dnn_spec", &self.dnn_spec)
            .field("regularization_coefficient", &self.regularization_coefficient)
            .field("weights", &self.weights)
            .finish()
    }
}

impl<X> DnnApprox<X> {
    /// Network with weights drawn from the thread-local generator
    ///
    /// # Errors
    ///
    /// [`ApproxError::InvalidConfig`] if `dnn_spec` or `config` does not validate.
    pub fn new(feature_functions: Vec<FeatureFn<X>>, dnn_spec: DnnSpec, config: DnnConfig) -> Result<Self> {
        Self::with_rng(feature_functions, dnn_spec, config, &mut rand::thread_rng())
    }

    /// Network with every weight drawn as `N(0, 1) / sqrt(fan_in)` from `rng`
    ///
    /// # Errors
    ///
    /// [`ApproxError::InvalidConfig`] if `dnn_spec` or `config` does not validate.
    #[allow(clippy::cast_precision_loss)]
    pub fn with_rng<R: Rng>(
        feature_functions: Vec<FeatureFn<X>>,
        dnn_spec: DnnSpec,
        config: DnnConfig,
        rng: &mut R,
    ) -> Result<Self> {
        dnn_spec.validate()?;
        config.validate()?;
        let weights = dnn_spec
            .layer_shapes(feature_functions.len())
            .into_iter()
            .map(|(outputs, inputs)| {
                let scale = (inputs.max(1) as f64).sqrt();
                let parameters = Array2::from_shape_fn((outputs, inputs), |_| {
                    rng.sample::<f64, _>(StandardNormal) / scale
                });
                Weights::create(config.adam, parameters)
            })
            .collect();
        tracing::debug!(
            features = feature_functions.len(),
            hidden_layers = dnn_spec.neurons.len(),
            bias = dnn_spec.bias,
            "initialised network"
        );
        Ok(Self {
            feature_functions,
            dnn_spec,
            regularization_coefficient: config.regularization_coefficient,
            weights,
        })
    }

    /// Same network around explicit per-layer weights
    ///
    /// # Errors
    ///
    /// [`ApproxError::ShapeMismatch`] if the layer count or any layer's shape
    /// differs from what the [`DnnSpec`] and features call for.
    pub fn with_weights(&self, weights: Vec<Weights<Ix2>>) -> Result<Self> {
        let shapes = self.dnn_spec.layer_shapes(self.feature_functions.len());
        if weights.len() != shapes.len() {
            return Err(ApproxError::shape(&[shapes.len()], &[weights.len()]));
        }
        for (w, &(outputs, inputs)) in weights.iter().zip(&shapes) {
            if w.parameters().dim() != (outputs, inputs) {
                return Err(ApproxError::shape(&[outputs, inputs], w.parameters().shape()));
            }
        }
        Ok(Self {
            weights,
            ..self.clone()
        })
    }

    /// Per-layer weights, input layer first
    #[must_use]
    pub fn weights(&self) -> &[Weights<Ix2>] {
        &self.weights
    }

    /// Network shape and activations
    #[must_use]
    pub fn dnn_spec(&self) -> &DnnSpec {
        &self.dnn_spec
    }

    /// L2 penalty on the weights
    #[must_use]
    pub fn regularization_coefficient(&self) -> f64 {
        self.regularization_coefficient
    }

    /// Feature functions feeding the input layer
    #[must_use]
    pub fn feature_functions(&self) -> &[FeatureFn<X>] {
        &self.feature_functions
    }

    /// Run the network over `xs`, keeping every layer's input
    #[must_use]
    pub fn forward_propagation(&self, xs: &[X]) -> ForwardPass {
        let hidden = self.weights.len().saturating_sub(1);
        let mut layer_inputs = vec![feature_matrix(&self.feature_functions, xs)];
        for layer in &self.weights[..hidden] {
            let input = &layer_inputs[layer_inputs.len() - 1];
            let activated = self
                .dnn_spec
                .hidden_activation
                .apply(&input.dot(&layer.parameters().t()));
            let next = if self.dnn_spec.bias {
                prepend_bias(&activated)
            } else {
                activated
            };
            layer_inputs.push(next);
        }
        let output = match (self.weights.last(), layer_inputs.last()) {
            (Some(layer), Some(input)) => self
                .dnn_spec
                .output_activation
                .apply(&input.dot(&layer.parameters().t()))
                .column(0)
                .to_owned(),
            _ => Array1::zeros(xs.len()),
        };
        ForwardPass {
            layer_inputs,
            output,
        }
    }

    /// Per-layer gradients (input layer first) of an objective whose
    /// derivative with respect to each example's output is `obj_deriv_out`.
    ///
    /// The output derivative is first multiplied by the output activation's
    /// derivative, then pushed back one layer at a time through the
    /// transposed weights and the hidden activation's derivative, dropping
    /// the bias row when bias units are on.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn backward_propagation(&self, forward: &ForwardPass, obj_deriv_out: &Array1<f64>) -> Vec<Array2<f64>> {
        let n = obj_deriv_out.len().max(1) as f64;
        let output = forward.output.clone().insert_axis(Axis(1));
        let mut deriv = obj_deriv_out.clone().insert_axis(Axis(0))
            * self.dnn_spec.output_activation.derivative(&output).reversed_axes();

        let mut gradients = Vec::with_capacity(self.weights.len());
        for i in (0..self.weights.len()).rev() {
            let input = &forward.layer_inputs[i];
            gradients.push(deriv.dot(input) / n);
            if i > 0 {
                let propagated = self.weights[i].parameters().t().dot(&deriv)
                    * self.dnn_spec.hidden_activation.derivative(input).reversed_axes();
                deriv = if self.dnn_spec.bias {
                    propagated.slice(s![1.., ..]).to_owned()
                } else {
                    propagated
                };
            }
        }
        gradients.reverse();
        gradients
    }

    fn check_layer_count(&self, other: &[Weights<Ix2>]) -> Result<()> {
        if other.len() == self.weights.len() {
            Ok(())
        } else {
            Err(ApproxError::shape(&[self.weights.len()], &[other.len()]))
        }
    }
}

fn prepend_bias(activated: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = activated.dim();
    Array2::from_shape_fn((rows, cols + 1), |(i, j)| {
        if j == 0 {
            1.0
        } else {
            activated[[i, j - 1]]
        }
    })
}

impl<X: Clone> Parameterized for DnnApprox<X> {
    fn combine(&self, other: &Self) -> Result<Self> {
        self.check_layer_count(&other.weights)?;
        let weights = self
            .weights
            .iter()
            .zip(&other.weights)
            .map(|(a, b)| {
                if a.parameters().shape() != b.parameters().shape() {
                    return Err(ApproxError::shape(a.parameters().shape(), b.parameters().shape()));
                }
                a.with_parameters(a.parameters() + b.parameters())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            weights,
            ..self.clone()
        })
    }

    fn scale(&self, factor: f64) -> Self {
        let weights = self
            .weights
            .iter()
            .map(|w| w.map_parameters(|p| p * factor))
            .collect();
        Self {
            weights,
            ..self.clone()
        }
    }
}

impl<X: Clone> FunctionApprox<X> for DnnApprox<X> {
    fn evaluate(&self, xs: &[X]) -> Array1<f64> {
        self.forward_propagation(xs).output
    }

    /// Backpropagated gradient plus `lambda * w` for every layer
    fn objective_gradient<D>(&self, xy_pairs: &[(X, f64)], obj_deriv_out: D) -> Result<Gradient<Self>>
    where
        D: FnOnce(&[X], &[f64]) -> Array1<f64>,
    {
        let (xs, derivative) = objective_derivative(xy_pairs, obj_deriv_out)?;
        let forward = self.forward_propagation(&xs);
        let weights = self
            .backward_propagation(&forward, &derivative)
            .into_iter()
            .zip(&self.weights)
            .map(|(gradient, w)| {
                w.with_parameters(gradient + w.parameters() * self.regularization_coefficient)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Gradient::new(Self {
            weights,
            ..self.clone()
        }))
    }

    /// One Adam step per layer; every layer's step count advances by 1
    fn update_with_gradient(&self, gradient: &Gradient<Self>) -> Result<Self> {
        let layer_gradients = &gradient.function_approx().weights;
        self.check_layer_count(layer_gradients)?;
        let weights = self
            .weights
            .iter()
            .zip(layer_gradients)
            .map(|(w, g)| w.update(g.parameters()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            weights,
            ..self.clone()
        })
    }

    fn within(&self, other: &Self, tolerance: f64) -> bool {
        self.weights.len() == other.weights.len()
            && self
                .weights
                .iter()
                .zip(&other.weights)
                .all(|(a, b)| a.within(b, tolerance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::feature;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn affine() -> Vec<FeatureFn<f64>> {
        vec![feature(|_| 1.0), feature(|x: &f64| *x)]
    }

    fn layers(neurons: Vec<usize>, hidden: Activation, output: Activation) -> DnnSpec {
        DnnSpec {
            neurons,
            bias: true,
            hidden_activation: hidden,
            output_activation: output,
        }
    }

    fn seeded(dnn_spec: DnnSpec, config: DnnConfig) -> DnnApprox<f64> {
        DnnApprox::with_rng(affine(), dnn_spec, config, &mut StdRng::seed_from_u64(7)).unwrap()
    }

    fn squared_error(net: &DnnApprox<f64>, data: &[(f64, f64)]) -> f64 {
        let xs: Vec<f64> = data.iter().map(|(x, _)| *x).collect();
        let errors = net.evaluate(&xs) - &data.iter().map(|(_, y)| *y).collect::<Array1<f64>>();
        errors.mapv(|e| e * e).sum() / (2.0 * data.len() as f64)
    }

    fn data() -> Vec<(f64, f64)> {
        (-4..=4).map(|i| f64::from(i) / 4.0).map(|x| (x, x * x - 0.5)).collect()
    }

    #[test]
    fn test_layer_shapes() {
        let dnn_spec = layers(vec![4, 2], Activation::Relu, Activation::Identity);
        assert_eq!(dnn_spec.layer_shapes(3), vec![(4, 3), (2, 5), (1, 3)]);
        let no_bias = DnnSpec {
            bias: false,
            ..dnn_spec
        };
        assert_eq!(no_bias.layer_shapes(3), vec![(4, 3), (2, 4), (1, 2)]);
        assert_eq!(DnnSpec::default().layer_shapes(5), vec![(1, 5)]);
    }

    #[test]
    fn test_forward_by_hand() {
        let adam = AdamConfig::default();
        let net = seeded(layers(vec![2], Activation::Relu, Activation::Identity), DnnConfig::default())
            .with_weights(vec![
                Weights::create(adam, arr2(&[[1.0, 1.0], [-1.0, 2.0]])),
                Weights::create(adam, arr2(&[[0.5, 1.0, -1.0]])),
            ])
            .unwrap();
        let forward = net.forward_propagation(&[1.0, -1.0]);
        // hidden outputs relu([2, 1]) and relu([0, -3]), bias first
        assert_eq!(forward.layer_inputs[1], arr2(&[[1.0, 2.0, 1.0], [1.0, 0.0, 0.0]]));
        assert_eq!(forward.output, arr1(&[1.5, 0.5]));
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let net = seeded(layers(vec![3, 2], Activation::Tanh, Activation::Sigmoid), DnnConfig::default());
        let data = data();
        let gradient = net
            .objective_gradient(&data, |xs, ys| net.evaluate(xs) - &Array1::from(ys.to_vec()))
            .unwrap();
        let h = 1e-6;
        for (layer, g) in gradient.function_approx().weights().iter().enumerate() {
            for ((i, j), &analytic) in g.parameters().indexed_iter() {
                let shifted = |delta: f64| {
                    let mut weights = net.weights().to_vec();
                    let mut parameters = weights[layer].parameters().clone();
                    parameters[[i, j]] += delta;
                    weights[layer] = weights[layer].with_parameters(parameters).unwrap();
                    squared_error(&net.with_weights(weights).unwrap(), &data)
                };
                let numeric = (shifted(h) - shifted(-h)) / (2.0 * h);
                assert_abs_diff_eq!(analytic, numeric, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn test_scale_every_layer_keeps_adam_state() {
        let net = seeded(layers(vec![2], Activation::Tanh, Activation::Identity), DnnConfig::default())
            .update(&data())
            .unwrap();
        let halved = net.scale(0.5);
        for (h, w) in halved.weights().iter().zip(net.weights()) {
            assert_eq!(h.parameters(), &w.parameters().mapv(|p| p * 0.5));
            assert_eq!(h.step(), 1);
            assert_eq!(h.moment2(), w.moment2());
        }
        assert!(net.zero().weights().iter().all(|w| w.parameters().iter().all(|p| *p == 0.0)));
    }

    #[test]
    fn test_regularization_adds_scaled_weights() {
        let config = DnnConfig {
            regularization_coefficient: 0.3,
            ..DnnConfig::default()
        };
        let net = seeded(layers(vec![2], Activation::Sigmoid, Activation::Identity), config);
        let gradient = net
            .objective_gradient(&data(), |xs, _| Array1::zeros(xs.len()))
            .unwrap();
        for (g, w) in gradient.function_approx().weights().iter().zip(net.weights()) {
            for (a, b) in g.parameters().iter().zip(w.parameters().iter()) {
                assert_abs_diff_eq!(*a, 0.3 * b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_update_steps_every_layer_once() {
        let net = seeded(layers(vec![3, 3], Activation::Relu, Activation::Identity), DnnConfig::default());
        let updated = net.update(&data()).unwrap();
        assert_eq!(updated.weights().len(), 3);
        assert!(updated.weights().iter().all(|w| w.step() == 1));
        assert!(net.weights().iter().all(|w| w.step() == 0));
    }

    #[test]
    fn test_training_reduces_error() {
        let config = DnnConfig {
            adam: AdamConfig::new(0.01, 0.9, 0.999).unwrap(),
            ..DnnConfig::default()
        };
        let net = seeded(layers(vec![6], Activation::Tanh, Activation::Identity), config);
        let data = data();
        let before = net.rmse(&data).unwrap();
        let trained = net
            .iterate_updates(std::iter::repeat(data.as_slice()).take(300))
            .last()
            .unwrap()
            .unwrap();
        assert!(trained.rmse(&data).unwrap() < before);
    }

    #[test]
    fn test_seeded_construction_is_reproducible() {
        let dnn_spec = layers(vec![3], Activation::Tanh, Activation::Identity);
        let a = seeded(dnn_spec.clone(), DnnConfig::default());
        let b = seeded(dnn_spec, DnnConfig::default());
        assert!(a.within(&b, 0.0));
    }

    #[test]
    fn test_with_weights_validates_shapes() {
        let net = seeded(layers(vec![2], Activation::Relu, Activation::Identity), DnnConfig::default());
        let adam = AdamConfig::default();
        let too_few = vec![Weights::create(adam, Array2::zeros((1, 2)))];
        assert!(matches!(net.with_weights(too_few), Err(ApproxError::ShapeMismatch { .. })));
        let wrong_shape = vec![
            Weights::create(adam, Array2::zeros((2, 2))),
            Weights::create(adam, Array2::zeros((1, 2))),
        ];
        assert!(matches!(net.with_weights(wrong_shape), Err(ApproxError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_mismatched_networks() {
        let small = seeded(layers(vec![2], Activation::Relu, Activation::Identity), DnnConfig::default());
        let deep = seeded(layers(vec![2, 2], Activation::Relu, Activation::Identity), DnnConfig::default());
        assert!(small.combine(&deep).is_err());
        assert!(!small.within(&deep, f64::INFINITY));
        let gradient = deep.objective_gradient(&data(), |xs, _| Array1::ones(xs.len())).unwrap();
        assert!(small.update_with_gradient(&gradient).is_err());
    }

    #[test]
    fn test_invalid_configuration() {
        let result = DnnApprox::new(affine(), layers(vec![3, 0], Activation::Relu, Activation::Identity), DnnConfig::default());
        assert!(matches!(result, Err(ApproxError::InvalidConfig(_))));
        let config = DnnConfig::from_json(r#"{"regularization_coefficient": 0.01}"#).unwrap();
        assert_abs_diff_eq!(config.adam.learning_rate, 0.001);
        let dnn_spec: DnnSpec = serde_json::from_str(
            r#"{"neurons": [4], "bias": true, "hidden_activation": "relu", "output_activation": "identity"}"#,
        )
        .unwrap();
        assert_eq!(dnn_spec.layer_shapes(2), vec![(4, 2), (1, 5)]);
    }
}
