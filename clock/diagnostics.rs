//! Posterior summaries and convergence diagnostics.

use crate::hmc::Trace;
use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Summary of one parameter's pooled draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub hdi_low: f64,
    pub hdi_high: f64,
    pub r_hat: f64,
    pub ess: f64,
}

/// The persisted result of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    pub hdi_prob: f64,
    pub chains: usize,
    pub draws_per_chain: usize,
    pub parameters: Vec<ParameterSummary>,
}

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Failed to read or write posterior summary: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML posterior summary: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize posterior summary to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

impl PosteriorSummary {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSummary> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn save(&self, path: &Path) -> Result<(), SummaryError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SummaryError> {
        let toml_string = fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_string)?)
    }
}

/// Summarizes every parameter of `trace`, one parameter per rayon task.
pub fn summarize(trace: &Trace, hdi_prob: f64) -> PosteriorSummary {
    let parameters: Vec<ParameterSummary> = trace
        .parameter_names
        .par_iter()
        .enumerate()
        .map(|(index, name)| {
            let chains = trace.chain_values(index);
            let mut pooled = trace.pooled(index);
            let (mean, sd) = mean_and_sd(&pooled);
            pooled.sort_by(f64::total_cmp);
            let (hdi_low, hdi_high) = hdi(&pooled, hdi_prob);
            ParameterSummary {
                name: name.clone(),
                mean,
                sd,
                hdi_low,
                hdi_high,
                r_hat: r_hat(&chains),
                ess: ess(&chains),
            }
        })
        .collect();

    if let Some(stats) = trace.run_stats {
        let mean_r_hat =
            parameters.iter().map(|p| p.r_hat).sum::<f64>() / parameters.len().max(1) as f64;
        log::debug!(
            "Mean split R-hat {mean_r_hat:.4} (sampler reported {:.4}, mean ESS {:.1})",
            stats.mean_r_hat,
            stats.mean_ess
        );
    }
    for parameter in parameters.iter().filter(|p| p.r_hat > 1.1) {
        log::warn!(
            "R-hat for '{}' is {:.3}; chains have not mixed",
            parameter.name,
            parameter.r_hat
        );
    }

    PosteriorSummary {
        hdi_prob,
        chains: trace.chains.len(),
        draws_per_chain: trace.chains.first().map(|chain| chain.nrows()).unwrap_or(0),
        parameters,
    }
}

/// Sample mean and standard deviation (n - 1 denominator).
pub fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, f64::NAN);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Narrowest interval `[x(i), x(i + k)]` over sorted draws, with `k = floor(prob * n)`.
pub fn hdi(sorted: &[f64], prob: f64) -> (f64, f64) {
    let n = sorted.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let span = ((prob * n as f64).floor() as usize).min(n - 1);
    let (start, _) = (0..n - span)
        .map(|i| (i, sorted[i + span] - sorted[i]))
        .fold((0, f64::INFINITY), |best, candidate| {
            if candidate.1 < best.1 { candidate } else { best }
        });
    (sorted[start], sorted[start + span])
}

/// Split R-hat. Each chain is halved, so a single chain still yields a value.
pub fn r_hat(chains: &[ArrayView1<f64>]) -> f64 {
    let Some(halves) = split_halves(chains) else {
        return f64::NAN;
    };
    let m = halves.len() as f64;
    let n = halves[0].len() as f64;

    let (means, variances): (Vec<f64>, Vec<f64>) = halves
        .iter()
        .map(|half| {
            let (mean, sd) = mean_and_sd(half);
            (mean, sd * sd)
        })
        .unzip();
    let grand_mean = means.iter().sum::<f64>() / m;
    let between = means.iter().map(|mu| (mu - grand_mean).powi(2)).sum::<f64>() * n / (m - 1.0);
    let within = variances.iter().sum::<f64>() / m;
    if within < 1e-30 {
        return f64::NAN;
    }
    let var_plus = (n - 1.0) / n * within + between / n;
    (var_plus / within).sqrt()
}

/// Effective sample size from the multi-chain autocorrelation with Geyer's initial
/// positive sequence truncation.
pub fn ess(chains: &[ArrayView1<f64>]) -> f64 {
    let n = chains.iter().map(|c| c.len()).min().unwrap_or(0);
    if chains.is_empty() || n < 4 {
        return f64::NAN;
    }
    let m = chains.len() as f64;
    let chains: Vec<Vec<f64>> = chains
        .iter()
        .map(|c| c.iter().take(n).copied().collect())
        .collect();

    let stats: Vec<(f64, f64)> = chains.iter().map(|c| mean_and_sd(c)).collect();
    let means: Vec<f64> = stats.iter().map(|s| s.0).collect();
    let within = stats.iter().map(|s| s.1 * s.1).sum::<f64>() / m;
    if within < 1e-30 {
        return f64::NAN;
    }
    let var_plus = if chains.len() > 1 {
        let grand_mean = means.iter().sum::<f64>() / m;
        let between = means.iter().map(|mu| (mu - grand_mean).powi(2)).sum::<f64>()
            * n as f64
            / (m - 1.0);
        (n as f64 - 1.0) / n as f64 * within + between / n as f64
    } else {
        (n as f64 - 1.0) / n as f64 * within
    };

    let autocovariance = |lag: usize| -> f64 {
        chains
            .iter()
            .zip(&means)
            .map(|(chain, mean)| {
                (0..n - lag)
                    .map(|i| (chain[i] - mean) * (chain[i + lag] - mean))
                    .sum::<f64>()
                    / n as f64
            })
            .sum::<f64>()
            / m
    };
    let rho = |lag: usize| 1.0 - (within - autocovariance(lag)) / var_plus;

    let mut tau = -1.0;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = rho(lag) + rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        tau += 2.0 * pair;
        lag += 2;
    }
    let total = m * n as f64;
    total / tau.max(1.0 / total.log10())
}

fn split_halves(chains: &[ArrayView1<f64>]) -> Option<Vec<Vec<f64>>> {
    let shortest = chains.iter().map(|c| c.len()).min()?;
    let half = shortest / 2;
    if half < 2 {
        return None;
    }
    let halves = chains
        .iter()
        .flat_map(|chain| {
            let values: Vec<f64> = chain.iter().take(2 * half).copied().collect();
            [values[..half].to_vec(), values[half..].to_vec()]
        })
        .collect();
    Some(halves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};
    use rand::SeedableRng;
    use rand::distributions::{Distribution, Open01};
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    /// Independent uniform draws from a seeded generator.
    fn scrambled(n: usize, seed: u64) -> Array1<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| Open01.sample(&mut rng)).collect()
    }

    #[test]
    fn hdi_of_uniform_grid() {
        let sorted: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();
        let (low, high) = hdi(&sorted, 0.9);
        assert_abs_diff_eq!(high - low, 0.90, epsilon = 1e-12);
    }

    #[test]
    fn hdi_prefers_the_dense_region() {
        let mut values = vec![0.0, 10.0, 10.1, 10.2, 10.3, 10.4, 10.5, 10.6, 10.7, 50.0];
        values.sort_by(f64::total_cmp);
        let (low, high) = hdi(&values, 0.7);
        assert_eq!((low, high), (10.0, 10.7));
    }

    #[test]
    fn r_hat_near_one_for_identical_distributions() {
        let a = scrambled(1000, 1);
        let b = scrambled(1000, 2);
        let value = r_hat(&[a.view(), b.view()]);
        assert_abs_diff_eq!(value, 1.0, epsilon = 0.02);
    }

    #[test]
    fn r_hat_flags_disagreeing_chains() {
        let a = scrambled(500, 0);
        let b = scrambled(500, 0).mapv(|v| v + 5.0);
        assert!(r_hat(&[a.view(), b.view()]) > 2.0);
    }

    #[test]
    fn ess_is_small_for_sticky_chains() {
        let sticky: Array1<f64> = (0..1000).map(|i| (i / 100) as f64).collect();
        let mixed = scrambled(1000, 5);
        let sticky_ess = ess(&[sticky.view()]);
        let mixed_ess = ess(&[mixed.view()]);
        assert!(sticky_ess < 50.0, "sticky ess {sticky_ess}");
        assert!(mixed_ess > 300.0, "mixed ess {mixed_ess}");
    }

    #[test]
    fn summary_round_trips_through_toml() {
        let draws = Array2::from_shape_fn((200, 2), |(i, j)| {
            ((i * 7919 + j * 104729) % 997) as f64 / 997.0 + j as f64
        });
        let trace = Trace {
            parameter_names: vec!["alpha".to_string(), "beta".to_string()],
            chains: vec![draws],
            run_stats: None,
        };
        let summary = summarize(&trace, 0.94);
        assert_eq!(summary.draws_per_chain, 200);
        let beta = summary.parameter("beta").unwrap();
        assert!(beta.mean > 1.0 && beta.mean < 2.0);
        assert!(beta.hdi_low < beta.mean && beta.mean < beta.hdi_high);

        let dir = tempdir().unwrap();
        let path = dir.path().join("posterior.toml");
        summary.save(&path).unwrap();
        assert_eq!(PosteriorSummary::load(&path).unwrap(), summary);
    }
}
