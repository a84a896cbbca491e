//! # qsfw-sim
//!
//! Quantum–spectral–fractal weaving: a truncated quantum oscillator under a
//! Lindblad master equation, coupled both ways to a Kuramoto network of
//! phase oscillators.
//!
//! ```text
//! ρ (D×D) ──⟨a + a†⟩──▶ phase kick ──▶ Kuramoto step ──▶ mean sin θ
//!   ▲                                                        │
//!   └──────────── H = 2·a†a + 0.1·(mean sin θ)·(a + a†) ◀────┘
//! ```
//!
//! On top of single runs the crate sweeps the (α, Γ) plane, reduces each
//! run to coherence, 1/f fractal dimension and an integration measure,
//! traces the ridge of maximal coherence × integration, and generates
//! simulated EEG at the ridge midpoint.
//!
//! ## Usage
//!
//! ```no_run
//! use qsfw_sim::prelude::*;
//!
//! let config = SimulationConfig {
//!     seed: Some(42),
//!     ..SimulationConfig::default()
//! };
//! let cache = OperatorCache::global();
//! let run = run_simulation(
//!     &config,
//!     &CouplingParameters::default(),
//!     &cache,
//!     &CancelToken::new(),
//! )?;
//! println!("late coherence: {}", run.late_quantum_mean());
//! # Ok::<(), QsfwError>(())
//! ```

pub mod config;
pub mod eeg;
pub mod error;
pub mod filter;
pub mod integration;
pub mod notebook;
pub mod operators;
pub mod oscillators;
pub mod params;
pub mod quantum;
pub mod ridge;
pub mod simulation;
pub mod spectral;
pub mod sweep;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::eeg::*;
    pub use crate::error::*;
    pub use crate::integration::*;
    pub use crate::notebook::*;
    pub use crate::operators::*;
    pub use crate::oscillators::*;
    pub use crate::params::*;
    pub use crate::quantum::*;
    pub use crate::ridge::*;
    pub use crate::simulation::*;
    pub use crate::spectral::*;
    pub use crate::sweep::*;
}
