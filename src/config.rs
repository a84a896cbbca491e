//! Experiment configuration loaded from JSON.
//!
//! Every section is optional; missing fields take the model's defaults, so
//! `{}` is a complete configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::eeg::EegConfig;
use crate::error::{QsfwError, QsfwResult};
use crate::integration::IntegrationPolicy;
use crate::simulation::SimulationConfig;
use crate::sweep::SweepConfig;

/// Everything a `qsfw` invocation can be told up front.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Settings of a single run. The sweep uses these with T = 100.
    pub simulation: SimulationConfig,
    pub sweep: SweepConfig,
    pub integration: IntegrationPolicy,
    pub eeg: EegConfig,
}

impl ExperimentConfig {
    /// Validate every section, reporting failures as config errors.
    pub fn validate(&self) -> QsfwResult<()> {
        let as_config = |section: &str, err: QsfwError| match err {
            QsfwError::InvalidArgument(msg) => QsfwError::Config(format!("{section}: {msg}")),
            other => other,
        };
        self.simulation
            .validate()
            .map_err(|e| as_config("simulation", e))?;
        self.sweep.validate().map_err(|e| as_config("sweep", e))?;
        self.integration
            .validate()
            .map_err(|e| as_config("integration", e))?;

        if self.eeg.channels < 1 {
            return Err(QsfwError::Config(
                "eeg: channels must be >= 1".to_string(),
            ));
        }
        if !(self.eeg.duration.is_finite() && self.eeg.duration > 0.0) {
            return Err(QsfwError::Config(format!(
                "eeg: duration must be > 0, got {}",
                self.eeg.duration
            )));
        }
        if !(self.eeg.cutoff > 0.0 && self.eeg.cutoff < 1.0) {
            return Err(QsfwError::Config(format!(
                "eeg: cutoff must be in (0, 1), got {}",
                self.eeg.cutoff
            )));
        }
        if self.eeg.filter_order < 1 {
            return Err(QsfwError::Config(
                "eeg: filter_order must be >= 1".to_string(),
            ));
        }
        let fs = 1.0 / self.simulation.dt_network;
        self.eeg
            .fit_band
            .validate(fs)
            .map_err(|e| as_config("eeg", e))?;
        self.sweep
            .fit_band
            .validate(fs)
            .map_err(|e| as_config("sweep", e))
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> QsfwResult<Self> {
        serde_json::from_str(json).map_err(|e| QsfwError::Config(format!("JSON parse error: {e}")))
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> QsfwResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        config.validate()?;
        Ok(config)
    }
}
