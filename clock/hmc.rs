//! NUTS posterior sampling using mini-mcmc.
//!
//! Any [`LogDensity`] is wrapped as a `mini_mcmc` gradient target. The log density
//! and gradient are computed analytically on plain slices, so burn's autodiff is
//! never traced; the backend tensors only carry values in and out. NUTS tunes its
//! step size towards `target_accept` during the discarded warmup iterations.
//!
//! Chains start from the model's initial position with `Uniform(-1, 1)` jitter drawn
//! from an RNG seeded with `seed`, and the sampler itself is seeded with the same
//! value, so a fixed seed reproduces the trace.

use crate::config::{ConfigError, SamplerConfig};
use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use burn::tensor::TensorData;
use mini_mcmc::distributions::GradientTarget;
use mini_mcmc::nuts::NUTS;
use ndarray::{Array2, ArrayView1};
use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use std::sync::Arc;
use thiserror::Error;

/// Backend type for NUTS, f64 throughout.
pub type NutsBackend = Autodiff<NdArray<f64>>;

/// A differentiable log density over an unconstrained parameter vector.
pub trait LogDensity: Send + Sync {
    fn dim(&self) -> usize;

    /// Names of the constrained parameters, in the order [`LogDensity::constrain`]
    /// returns them.
    fn parameter_names(&self) -> &[&'static str];

    /// Unconstrained starting point before per-chain jitter.
    fn initial_position(&self) -> Vec<f64>;

    /// Maps an unconstrained position to the reported parameter values.
    fn constrain(&self, position: &[f64]) -> Vec<f64>;

    /// Log density (including any Jacobian terms) and its gradient.
    fn log_density_and_gradient(&self, position: &[f64]) -> (f64, Vec<f64>);
}

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Invalid sampler configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Chain {chain} could not find a starting point with finite log density.")]
    NonFiniteStart { chain: usize },
    #[error("NUTS sampling failed: {0}")]
    Nuts(String),
    #[error("Could not read draws back from the sampler: {0}")]
    Tensor(String),
}

/// Convergence figures reported by the sampler itself, averaged over parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub mean_r_hat: f64,
    pub mean_ess: f64,
}

/// All chains of one run, on the constrained scale.
#[derive(Debug, Clone)]
pub struct Trace {
    pub parameter_names: Vec<String>,
    /// One `[draws, parameters]` array per chain.
    pub chains: Vec<Array2<f64>>,
    /// `None` for traces that did not come out of [`sample`].
    pub run_stats: Option<RunStats>,
}

impl Trace {
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names.iter().position(|p| p == name)
    }

    /// Draws of one parameter for every chain.
    pub fn chain_values(&self, parameter: usize) -> Vec<ArrayView1<'_, f64>> {
        self.chains
            .iter()
            .map(|chain| chain.column(parameter))
            .collect()
    }

    /// Draws of one parameter pooled over chains, chain after chain.
    pub fn pooled(&self, parameter: usize) -> Vec<f64> {
        self.chain_values(parameter)
            .into_iter()
            .flat_map(|column| column.to_vec())
            .collect()
    }

    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(|chain| chain.nrows()).sum()
    }
}

/// Adapts a [`LogDensity`] to mini-mcmc. The model sits behind an `Arc` because the
/// sampler clones its target for every chain.
struct NutsTarget<M> {
    model: Arc<M>,
}

impl<M> Clone for NutsTarget<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
        }
    }
}

impl<M: LogDensity> NutsTarget<M> {
    /// Log density and gradient at a backend position. A position that cannot be
    /// read back as `dim` f64 values gets `-inf`, which NUTS treats as rejected.
    fn evaluate(&self, z: Tensor<NutsBackend, 1>) -> (f64, Vec<f64>) {
        let dim = self.model.dim();
        match z.into_data().to_vec::<f64>() {
            Ok(position) if position.len() == dim => {
                self.model.log_density_and_gradient(&position)
            }
            _ => (f64::NEG_INFINITY, vec![0.0; dim]),
        }
    }
}

impl<M: LogDensity> GradientTarget<f64, NutsBackend> for NutsTarget<M> {
    fn unnorm_logp(&self, z: Tensor<NutsBackend, 1>) -> Tensor<NutsBackend, 1> {
        let device = z.device();
        let (logp, _) = self.evaluate(z);
        Tensor::<NutsBackend, 1>::from_data(TensorData::new(vec![logp], [1]), &device)
    }

    fn unnorm_logp_and_grad(
        &self,
        z: Tensor<NutsBackend, 1>,
    ) -> (Tensor<NutsBackend, 1>, Tensor<NutsBackend, 1>) {
        let device = z.device();
        let dim = self.model.dim();
        let (logp, gradient) = self.evaluate(z);

        let logp_tensor =
            Tensor::<NutsBackend, 1>::from_data(TensorData::new(vec![logp], [1]), &device);
        let grad_tensor =
            Tensor::<NutsBackend, 1>::from_data(TensorData::new(gradient, [dim]), &device);
        (logp_tensor, grad_tensor)
    }
}

/// Runs every chain and returns the kept draws.
pub fn sample<M: LogDensity + Clone + 'static>(
    model: &M,
    config: &SamplerConfig,
) -> Result<Trace, SamplerError> {
    config.validate()?;
    log::info!(
        "Sampling {} chains with NUTS: {} tuning + {} kept iterations each",
        config.chains,
        config.tune,
        config.draws
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let initial_positions = (0..config.chains)
        .map(|chain| initial_point(model, chain, &mut rng))
        .collect::<Result<Vec<_>, _>>()?;

    let target = NutsTarget {
        model: Arc::new(model.clone()),
    };
    let mut sampler = NUTS::<f64, NutsBackend, NutsTarget<M>>::new(
        target,
        initial_positions,
        config.target_accept,
    )
    .set_seed(config.seed);

    let (samples_tensor, run_stats) = sampler
        .run_progress(config.draws, config.tune)
        .map_err(|e| SamplerError::Nuts(e.to_string()))?;
    log::info!("NUTS sampling complete: {run_stats}");

    let [n_chains, n_draws, dim] = samples_tensor.dims();
    let data: Vec<f64> = samples_tensor
        .into_data()
        .to_vec()
        .map_err(|e| SamplerError::Tensor(format!("{e:?}")))?;

    let names = model.parameter_names().len();
    let chains = (0..n_chains)
        .map(|chain| {
            let mut draws = Array2::<f64>::zeros((n_draws, names));
            for (i, mut row) in draws.rows_mut().into_iter().enumerate() {
                let start = chain * n_draws * dim + i * dim;
                let constrained = model.constrain(&data[start..start + dim]);
                for (slot, value) in row.iter_mut().zip(constrained) {
                    *slot = value;
                }
            }
            draws
        })
        .collect();

    Ok(Trace {
        parameter_names: model
            .parameter_names()
            .iter()
            .map(|name| name.to_string())
            .collect(),
        chains,
        run_stats: Some(RunStats {
            mean_r_hat: f64::from(run_stats.rhat.mean),
            mean_ess: f64::from(run_stats.ess.mean),
        }),
    })
}

/// Jitters the model's starting point by `Uniform(-1, 1)` per coordinate, retrying a
/// bounded number of times until the log density is finite.
fn initial_point<M: LogDensity>(
    model: &M,
    chain: usize,
    rng: &mut StdRng,
) -> Result<Vec<f64>, SamplerError> {
    const MAX_ATTEMPTS: usize = 100;
    let jitter = Uniform::new(-1.0, 1.0);
    let center = model.initial_position();

    for attempt in 0..MAX_ATTEMPTS {
        let q: Vec<f64> = center
            .iter()
            .map(|c| c + jitter.sample(&mut *rng))
            .collect();
        let (log_density, gradient) = model.log_density_and_gradient(&q);
        if log_density.is_finite() && gradient.iter().all(|g| g.is_finite()) {
            if attempt > 0 {
                log::debug!("Chain {chain}: finite start found after {} attempts", attempt + 1);
            }
            return Ok(q);
        }
    }
    Err(SamplerError::NonFiniteStart { chain })
}
