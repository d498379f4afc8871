use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Settings for the posterior sampler. Missing keys in a TOML file fall back to the
/// defaults, which mirror a common 1000 tuning + 1000 kept draws setup on 4 chains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Kept draws per chain.
    pub draws: usize,
    /// Warmup iterations per chain, used for step size adaptation and then discarded.
    pub tune: usize,
    pub chains: usize,
    /// Target mean acceptance probability for NUTS step size adaptation.
    pub target_accept: f64,
    pub seed: u64,
    /// Probability mass covered by the reported highest-density intervals.
    pub hdi_prob: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            draws: 1000,
            tune: 1000,
            chains: 4,
            target_accept: 0.8,
            seed: 42,
            hdi_prob: 0.94,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid sampler setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SamplerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [("draws", self.draws), ("chains", self.chains)];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(ConfigError::Invalid {
                field: "target_accept",
                reason: format!("must lie strictly between 0 and 1, got {}", self.target_accept),
            });
        }
        if !(self.hdi_prob > 0.0 && self.hdi_prob < 1.0) {
            return Err(ConfigError::Invalid {
                field: "hdi_prob",
                reason: format!("must lie strictly between 0 and 1, got {}", self.hdi_prob),
            });
        }
        Ok(())
    }
}
