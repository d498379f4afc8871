//! # Age Regression on SCGN Methylation
//!
//! ```text
//! alpha ~ Normal(0, 1)
//! beta  ~ Normal(1, 1)
//! gamma ~ Exponential(1)
//! age_i ~ Normal(alpha + beta * SCGN_i, gamma)
//! ```
//!
//! The sampler works in the unconstrained space `(alpha, beta, s)` with
//! `gamma = exp(s)`. The log density therefore carries the log Jacobian `s` of that
//! transform, and its gradient is computed analytically.

use crate::hmc::LogDensity;
use crate::types::{BearSample, Marker};
use ndarray::{Array1, Zip};
use std::f64::consts::PI;
use thiserror::Error;

const ALPHA_PRIOR_MEAN: f64 = 0.0;
const ALPHA_PRIOR_SD: f64 = 1.0;
const BETA_PRIOR_MEAN: f64 = 1.0;
const BETA_PRIOR_SD: f64 = 1.0;
const GAMMA_PRIOR_RATE: f64 = 1.0;

pub const PARAMETER_NAMES: [&str; 3] = ["alpha", "beta", "gamma"];

#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("The regression needs at least one observation.")]
    NoObservations,
    #[error("Predictor and response lengths differ ({predictor} vs {response}).")]
    LengthMismatch { predictor: usize, response: usize },
    #[error("Non-finite value in the {0} vector.")]
    NonFinite(&'static str),
}

/// Normal linear regression of age on one methylation marker.
#[derive(Debug, Clone)]
pub struct AgeRegression {
    predictor: Array1<f64>,
    response: Array1<f64>,
}

impl AgeRegression {
    pub fn new(predictor: Array1<f64>, response: Array1<f64>) -> Result<Self, ModelError> {
        if predictor.len() != response.len() {
            return Err(ModelError::LengthMismatch {
                predictor: predictor.len(),
                response: response.len(),
            });
        }
        if predictor.is_empty() {
            return Err(ModelError::NoObservations);
        }
        if predictor.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("predictor"));
        }
        if response.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("response"));
        }
        Ok(Self {
            predictor,
            response,
        })
    }

    /// Age against the SCGN methylation level of every sample.
    pub fn from_samples(samples: &[BearSample]) -> Result<Self, ModelError> {
        let predictor: Array1<f64> = samples
            .iter()
            .map(|sample| sample.methylation(Marker::Scgn))
            .collect();
        let response: Array1<f64> = samples.iter().map(|sample| sample.age_years).collect();
        Self::new(predictor, response)
    }

    pub fn n_observations(&self) -> usize {
        self.response.len()
    }
}

impl LogDensity for AgeRegression {
    fn dim(&self) -> usize {
        PARAMETER_NAMES.len()
    }

    fn parameter_names(&self) -> &[&'static str] {
        &PARAMETER_NAMES
    }

    fn initial_position(&self) -> Vec<f64> {
        vec![ALPHA_PRIOR_MEAN, BETA_PRIOR_MEAN, (1.0 / GAMMA_PRIOR_RATE).ln()]
    }

    fn constrain(&self, position: &[f64]) -> Vec<f64> {
        vec![position[0], position[1], position[2].exp()]
    }

    fn log_density_and_gradient(&self, position: &[f64]) -> (f64, Vec<f64>) {
        let (alpha, beta, log_gamma) = (position[0], position[1], position[2]);
        let gamma = log_gamma.exp();
        let precision = (-2.0 * log_gamma).exp();
        let n = self.n_observations() as f64;

        let mut sum_r = 0.0;
        let mut sum_rx = 0.0;
        let mut sum_rr = 0.0;
        Zip::from(&self.predictor)
            .and(&self.response)
            .for_each(|&x, &y| {
                let r = y - alpha - beta * x;
                sum_r += r;
                sum_rx += r * x;
                sum_rr += r * r;
            });

        let half_log_two_pi = 0.5 * (2.0 * PI).ln();
        let alpha_z = (alpha - ALPHA_PRIOR_MEAN) / ALPHA_PRIOR_SD;
        let beta_z = (beta - BETA_PRIOR_MEAN) / BETA_PRIOR_SD;

        let log_prior = -0.5 * alpha_z * alpha_z - ALPHA_PRIOR_SD.ln() - half_log_two_pi
            - 0.5 * beta_z * beta_z
            - BETA_PRIOR_SD.ln()
            - half_log_two_pi
            + GAMMA_PRIOR_RATE.ln()
            - GAMMA_PRIOR_RATE * gamma;
        let log_jacobian = log_gamma;
        let log_likelihood = -n * (log_gamma + half_log_two_pi) - 0.5 * precision * sum_rr;
        let log_density = log_prior + log_jacobian + log_likelihood;

        let gradient = vec![
            -alpha_z / ALPHA_PRIOR_SD + precision * sum_r,
            -beta_z / BETA_PRIOR_SD + precision * sum_rx,
            -GAMMA_PRIOR_RATE * gamma + 1.0 - n + precision * sum_rr,
        ];
        (log_density, gradient)
    }
}
