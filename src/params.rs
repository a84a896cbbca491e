//! Coupling parameters and the model's structural constants.
//!
//! The parameter set is passed by value into every run. There is no
//! process-wide ALPHA/GAMMA/G0 state; a sweep builds a fresh value per cell.

use serde::{Deserialize, Serialize};

use crate::error::{QsfwError, QsfwResult};

/// Golden ratio φ, the frequency-scaling base of the oscillator network.
pub const PHI: f64 = 1.618;

/// Kuramoto coupling K among oscillators.
pub const KURAMOTO_COUPLING: f64 = 0.6;

/// Weight of the harmonic term 2·a†a in the Hamiltonian.
pub const HARMONIC_WEIGHT: f64 = 2.0;

/// Gain of the network mean field on the quadrature drive term.
pub const FIELD_GAIN: f64 = 0.1;

/// Gain of the quantum observable on the phase kick.
pub const DRIVE_GAIN: f64 = 0.1;

/// Std-dev of the multiplicative noise on each phase kick (mean 1).
pub const DRIVE_NOISE_STD: f64 = 0.1;

/// Mean and std-dev of the un-scaled natural frequencies.
pub const FREQUENCY_MEAN: f64 = 1.0;
pub const FREQUENCY_STD: f64 = 0.1;

/// Parameters of one coupled run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CouplingParameters {
    /// Coupling-decay exponent; natural frequencies scale as φ^(-2α).
    pub alpha: f64,
    /// Decoherence rate Γ of the collapse operator √Γ·a.
    pub gamma: f64,
    /// Base coupling strength. Recorded with results, not used by the dynamics.
    pub g0: f64,
}

impl Default for CouplingParameters {
    fn default() -> Self {
        Self {
            alpha: 1.2,
            gamma: 0.01,
            g0: 0.5,
        }
    }
}

impl CouplingParameters {
    pub fn new(alpha: f64, gamma: f64, g0: f64) -> Self {
        Self { alpha, gamma, g0 }
    }

    /// Copy with a different (alpha, gamma), as a sweep cell needs.
    pub fn with_cell(&self, alpha: f64, gamma: f64) -> Self {
        Self { alpha, gamma, ..*self }
    }

    pub fn validate(&self) -> QsfwResult<()> {
        if !self.alpha.is_finite() {
            return Err(QsfwError::invalid(format!(
                "alpha must be finite, got {}",
                self.alpha
            )));
        }
        if !self.gamma.is_finite() || self.gamma < 0.0 {
            return Err(QsfwError::invalid(format!(
                "gamma must be finite and >= 0, got {}",
                self.gamma
            )));
        }
        if !self.g0.is_finite() {
            return Err(QsfwError::invalid(format!(
                "g0 must be finite, got {}",
                self.g0
            )));
        }
        Ok(())
    }
}
