//! Simulated EEG from the oscillator population at the critical ridge.
//!
//! The forward model is deliberately crude: each channel is a random linear
//! mix of sin θᵢ over all oscillators, smoothed by a zero-phase Butterworth
//! low-pass standing in for skull and scalp.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::QsfwResult;
use crate::filter::{butter_lowpass, filtfilt};
use crate::operators::OperatorCache;
use crate::params::CouplingParameters;
use crate::ridge::{ridge_midpoint, RidgePoint};
use crate::simulation::{CancelToken, CoupledSimulator, SimulationConfig};
use crate::spectral::{
    fit_power_law, mean_spectrum, power_spectral_density, FrequencyBand, PowerLawFit, Spectrum,
    WelchConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EegConfig {
    /// Length of the underlying coupled run.
    pub duration: f64,
    pub channels: usize,
    pub filter_order: usize,
    /// Low-pass cutoff as a fraction of Nyquist.
    pub cutoff: f64,
    pub welch: WelchConfig,
    pub fit_band: FrequencyBand,
    pub seed: u64,
}

impl Default for EegConfig {
    fn default() -> Self {
        Self {
            duration: 1000.0,
            channels: 10,
            filter_order: 3,
            cutoff: 0.2,
            welch: WelchConfig::default(),
            fit_band: FrequencyBand::default(),
            seed: 42,
        }
    }
}

/// Channels, spectra and the 1/f fit of a simulated recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EegResult {
    pub alpha: f64,
    pub gamma: f64,
    pub sample_interval: f64,
    /// One filtered series per channel.
    pub channels: Vec<Vec<f64>>,
    pub frequencies: Vec<f64>,
    /// One PSD per channel on `frequencies`.
    pub psds: Vec<Vec<f64>>,
    pub mean_psd: Vec<f64>,
    pub fit: Option<PowerLawFit>,
    /// (5 - β) / 2 of the mean spectrum, NaN without a fit.
    pub fractal_dimension: f64,
}

impl EegResult {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Run the coupled model at the middle of `ridge` and derive EEG channels.
pub fn generate_simulated_eeg(
    ridge: &[RidgePoint],
    simulation: &SimulationConfig,
    cache: Arc<OperatorCache>,
    config: &EegConfig,
    cancel: &CancelToken,
) -> QsfwResult<EegResult> {
    let mid = ridge_midpoint(ridge)?;
    let params = CouplingParameters {
        alpha: mid.alpha,
        gamma: mid.gamma,
        ..CouplingParameters::default()
    };
    let tf = butter_lowpass(config.filter_order, config.cutoff)?;

    let run_config = SimulationConfig {
        duration: config.duration,
        ..simulation.clone()
    };
    info!(
        alpha = params.alpha,
        gamma = params.gamma,
        duration = config.duration,
        channels = config.channels,
        "generating simulated eeg"
    );
    let simulator = CoupledSimulator::new(run_config, cache)?;
    let (series, population) = simulator.simulate_population(&params, config.seed, cancel)?;
    let fs = series.sampling_rate();

    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let mut channels = Vec::with_capacity(config.channels);
    let mut spectra = Vec::with_capacity(config.channels);
    for channel in 0..config.channels {
        let weights: Vec<f64> = (0..population.units())
            .map(|_| rng.sample(StandardNormal))
            .collect();
        let raw = population.project(&weights);
        let filtered = filtfilt(&tf.b, &tf.a, &raw)?;
        spectra.push(power_spectral_density(&filtered, fs, &config.welch)?);
        debug!(channel, samples = filtered.len(), "eeg channel");
        channels.push(filtered);
    }

    let mean = mean_spectrum(&spectra)?;
    let fit = match fit_power_law(&mean, &config.fit_band) {
        Ok(fit) => Some(fit),
        Err(err) => {
            debug!(%err, "no power-law fit for eeg spectrum");
            None
        }
    };
    let fractal_dimension = fit.map_or(f64::NAN, |f| f.fractal_dimension());
    info!(
        beta = ?fit.map(|f| f.beta),
        fractal_dimension, "simulated eeg ready"
    );

    let Spectrum {
        frequencies,
        psd: mean_psd,
    } = mean;
    Ok(EegResult {
        alpha: params.alpha,
        gamma: params.gamma,
        sample_interval: series.sample_interval,
        channels,
        frequencies,
        psds: spectra.into_iter().map(|s| s.psd).collect(),
        mean_psd,
        fit,
        fractal_dimension,
    })
}
