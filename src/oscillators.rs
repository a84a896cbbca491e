//! Kuramoto phase-oscillator network (the "neural" level).
//!
//! ```text
//! dθᵢ/dt = ωᵢ + (K/N) Σⱼ sin(θⱼ - θᵢ)
//! ```
//!
//! Natural frequencies are drawn once at init as ωᵢ ~ N(1, 0.1) scaled by
//! φ^(-2α), so the coupling exponent α slows the whole population down.
//! Every update returns a new network; frequencies and K are fixed for the
//! lifetime of a run.

use std::f64::consts::TAU;

use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal, Uniform};

use crate::error::{QsfwError, QsfwResult};
use crate::params::{
    DRIVE_GAIN, DRIVE_NOISE_STD, FREQUENCY_MEAN, FREQUENCY_STD, KURAMOTO_COUPLING,
};

/// Population of coupled phase oscillators.
#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorNetwork {
    phases: Vec<f64>,
    natural_frequencies: Vec<f64>,
    coupling_strength: f64,
}

/// Wrap an angle into [0, 2π).
///
/// `rem_euclid` can round a tiny negative input up to exactly 2π, which is
/// mapped back to 0.
#[inline]
pub fn wrap_phase(theta: f64) -> f64 {
    let wrapped = theta.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

impl OscillatorNetwork {
    /// Random network of `size` oscillators.
    pub fn init<R: Rng + ?Sized>(
        size: usize,
        phi: f64,
        alpha: f64,
        rng: &mut R,
    ) -> QsfwResult<Self> {
        if size == 0 {
            return Err(QsfwError::invalid("network size must be >= 1"));
        }
        if !(phi.is_finite() && phi > 0.0) {
            return Err(QsfwError::invalid(format!("phi must be > 0, got {}", phi)));
        }
        if !alpha.is_finite() {
            return Err(QsfwError::invalid(format!(
                "alpha must be finite, got {}",
                alpha
            )));
        }

        let uniform = Uniform::new(0.0, TAU);
        let normal = Normal::new(FREQUENCY_MEAN, FREQUENCY_STD)
            .map_err(|e| QsfwError::invalid(format!("frequency distribution: {e}")))?;
        let scale = phi.powf(2.0 * alpha);

        let phases: Vec<f64> = (0..size).map(|_| uniform.sample(rng)).collect();
        let natural_frequencies: Vec<f64> =
            (0..size).map(|_| normal.sample(rng) / scale).collect();

        Ok(Self {
            phases,
            natural_frequencies,
            coupling_strength: KURAMOTO_COUPLING,
        })
    }

    /// Network from explicit phases and frequencies.
    pub fn from_parts(
        phases: Vec<f64>,
        natural_frequencies: Vec<f64>,
        coupling_strength: f64,
    ) -> QsfwResult<Self> {
        if phases.is_empty() {
            return Err(QsfwError::invalid("network size must be >= 1"));
        }
        if phases.len() != natural_frequencies.len() {
            return Err(QsfwError::invalid(format!(
                "{} phases but {} natural frequencies",
                phases.len(),
                natural_frequencies.len()
            )));
        }
        Ok(Self {
            phases,
            natural_frequencies,
            coupling_strength,
        })
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn phases(&self) -> &[f64] {
        &self.phases
    }

    pub fn natural_frequencies(&self) -> &[f64] {
        &self.natural_frequencies
    }

    pub fn coupling_strength(&self) -> f64 {
        self.coupling_strength
    }

    /// Kick every phase by 0.1 · observable · noiseᵢ, noiseᵢ ~ N(1, 0.1).
    pub fn apply_drive<R: Rng + ?Sized>(&self, observable: f64, rng: &mut R) -> Self {
        let phases = self
            .phases
            .iter()
            .map(|&theta| {
                let z: f64 = rng.sample(StandardNormal);
                theta + DRIVE_GAIN * observable * (1.0 + DRIVE_NOISE_STD * z)
            })
            .collect();
        Self {
            phases,
            natural_frequencies: self.natural_frequencies.clone(),
            coupling_strength: self.coupling_strength,
        }
    }

    /// One explicit-Euler Kuramoto step over all N² pairs, wrapped to [0, 2π).
    pub fn step(&self, dt: f64) -> Self {
        let n = self.phases.len();
        let k_over_n = self.coupling_strength / n as f64;

        let phases = self
            .phases
            .iter()
            .zip(&self.natural_frequencies)
            .map(|(&theta_i, &omega_i)| {
                let interaction: f64 = self
                    .phases
                    .iter()
                    .map(|&theta_j| (theta_j - theta_i).sin())
                    .sum();
                wrap_phase(theta_i + dt * (omega_i + k_over_n * interaction))
            })
            .collect();

        Self {
            phases,
            natural_frequencies: self.natural_frequencies.clone(),
            coupling_strength: self.coupling_strength,
        }
    }

    /// Mean of sin θᵢ. Drives the Hamiltonian and is recorded every tick.
    pub fn synchrony_metric(&self) -> f64 {
        self.phases.iter().map(|t| t.sin()).sum::<f64>() / self.phases.len() as f64
    }

    /// Kuramoto order parameter r·e^{iψ} = (1/N) Σ e^{iθⱼ}, returned as (r, ψ).
    pub fn order_parameter(&self) -> (f64, f64) {
        let n = self.phases.len() as f64;
        let (sum_cos, sum_sin) = self
            .phases
            .iter()
            .fold((0.0, 0.0), |(c, s), &t| (c + t.cos(), s + t.sin()));
        let (mean_cos, mean_sin) = (sum_cos / n, sum_sin / n);
        let r = (mean_cos * mean_cos + mean_sin * mean_sin).sqrt();
        (r, wrap_phase(mean_sin.atan2(mean_cos)))
    }

    /// sin θᵢ for every oscillator, one row of population activity.
    pub fn activity(&self) -> Vec<f64> {
        self.phases.iter().map(|t| t.sin()).collect()
    }
}
