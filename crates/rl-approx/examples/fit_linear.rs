//! Example: fitting noisy samples of a line with each approximator
//!
//! Run with `RUST_LOG=debug cargo run --example fit_linear` to see solver logs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rl_approx::prelude::*;
use rl_approx::{feature, Activation, AdamConfig, DnnConfig, DnnSpec, FeatureFn, LinearConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // y = 1.5 - 2x + noise
    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, 0.1)?;
    let data: Vec<(f64, f64)> = (0..500)
        .map(|_| {
            let x: f64 = rng.gen_range(-1.0..1.0);
            (x, 1.5 - 2.0 * x + noise.sample(&mut rng))
        })
        .collect();
    let features: Vec<FeatureFn<f64>> = vec![feature(|_| 1.0), feature(|x: &f64| *x)];

    // Closed form
    let direct = LinearApprox::new(features.clone(), LinearConfig::default())?.solve(&data, None)?;
    info!(
        weights = ?direct.weights().parameters(),
        rmse = direct.rmse(&data)?,
        "direct solve"
    );

    // Adam until successive weights agree to 1e-5
    let iterative_config = LinearConfig {
        adam: AdamConfig::new(0.05, 0.9, 0.999)?,
        direct_solve: false,
        ..LinearConfig::default()
    };
    let iterative = LinearApprox::new(features.clone(), iterative_config)?.solve(&data, Some(1e-5))?;
    info!(
        weights = ?iterative.weights().parameters(),
        steps = iterative.weights().step(),
        agrees = iterative.within(&direct, 1e-3),
        "iterative solve"
    );

    // A small network trained for a fixed number of passes
    let dnn_spec = DnnSpec {
        neurons: vec![4],
        bias: true,
        hidden_activation: Activation::Tanh,
        output_activation: Activation::Identity,
    };
    let dnn_config = DnnConfig {
        adam: AdamConfig::new(0.01, 0.9, 0.999)?,
        ..DnnConfig::default()
    };
    let net = DnnApprox::with_rng(features, dnn_spec, dnn_config, &mut rng)?;
    let passes = std::iter::repeat(data.as_slice()).take(500);
    for (pass, snapshot) in net.iterate_updates(passes).enumerate().step_by(100) {
        let snapshot = snapshot?;
        info!(pass, rmse = snapshot.rmse(&data)?, "dnn training");
    }

    Ok(())
}
