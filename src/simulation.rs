//! Coupled-run driver.
//!
//! One outer tick of the loop:
//! 1. `quantum_substeps` micro-steps: rebuild H from the current network,
//!    evolve ρ by dt_quantum under the master equation
//! 2. Measure ⟨a + a†⟩ once
//! 3. Kick the oscillator phases with that value
//! 4. Advance the network one Kuramoto step of dt_network
//! 5. Record (observable, synchrony)
//!
//! A [`Simulation`] walks Initializing → Running → Completed. The cancel
//! token is checked between ticks; a numerical failure abandons the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{QsfwError, QsfwResult};
use crate::operators::{LadderOperators, OperatorCache};
use crate::oscillators::OscillatorNetwork;
use crate::params::{CouplingParameters, PHI};
use crate::quantum::{self, QuantumState};

/// Run horizon the sweep uses for every cell.
pub const SWEEP_DURATION: f64 = 100.0;

/// Configuration of a single coupled run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Total simulated time T.
    pub duration: f64,
    /// Oscillator-network step (and sample interval of the output series).
    pub dt_network: f64,
    /// Length of one quantum micro-step.
    pub dt_quantum: f64,
    /// Quantum micro-steps per outer tick.
    pub quantum_substeps: usize,
    /// Fock-space dimension D.
    pub dim: usize,
    /// Number of oscillators N.
    pub network_size: usize,
    /// Frequency-scaling base φ.
    pub phi: f64,
    /// RNG seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration: 50.0,
            dt_network: 0.1,
            dt_quantum: 0.01,
            quantum_substeps: 5,
            dim: 4,
            network_size: 100,
            phi: PHI,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Defaults with the sweep's fixed short horizon.
    pub fn for_sweep() -> Self {
        Self {
            duration: SWEEP_DURATION,
            ..Self::default()
        }
    }

    /// floor(T / dt_network), tolerant of T being an exact multiple.
    pub fn tick_count(&self) -> usize {
        (self.duration / self.dt_network + 1e-9).floor() as usize
    }

    pub fn validate(&self) -> QsfwResult<()> {
        if !(self.duration.is_finite() && self.duration >= 0.0) {
            return Err(QsfwError::invalid(format!(
                "duration must be >= 0, got {}",
                self.duration
            )));
        }
        if !(self.dt_network.is_finite() && self.dt_network > 0.0) {
            return Err(QsfwError::invalid(format!(
                "dt_network must be > 0, got {}",
                self.dt_network
            )));
        }
        if !(self.dt_quantum.is_finite() && self.dt_quantum > 0.0) {
            return Err(QsfwError::invalid(format!(
                "dt_quantum must be > 0, got {}",
                self.dt_quantum
            )));
        }
        if self.dim < 1 {
            return Err(QsfwError::invalid("dim must be >= 1"));
        }
        if self.network_size < 1 {
            return Err(QsfwError::invalid("network_size must be >= 1"));
        }
        if !(self.phi.is_finite() && self.phi > 0.0) {
            return Err(QsfwError::invalid(format!("phi must be > 0, got {}", self.phi)));
        }
        Ok(())
    }
}

/// The two recorded series of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPair {
    /// ⟨a + a†⟩ after each tick's micro-steps.
    pub quantum: Vec<f64>,
    /// Mean sin θ after each tick's Kuramoto step.
    pub neural: Vec<f64>,
    /// Time between samples (dt_network).
    pub sample_interval: f64,
}

impl TimeSeriesPair {
    pub fn len(&self) -> usize {
        self.quantum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantum.is_empty()
    }

    pub fn sampling_rate(&self) -> f64 {
        1.0 / self.sample_interval
    }

    /// Sample times (t = k·dt, k = 0..len).
    pub fn times(&self) -> Vec<f64> {
        (0..self.len())
            .map(|k| k as f64 * self.sample_interval)
            .collect()
    }

    /// Mean of the second half of the observable series.
    pub fn late_quantum_mean(&self) -> f64 {
        let tail = &self.quantum[self.quantum.len() / 2..];
        if tail.is_empty() {
            return f64::NAN;
        }
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}

/// The synchrony series, the run's "neural" signal.
pub fn extract_neural_series(run: &TimeSeriesPair) -> &[f64] {
    &run.neural
}

/// sin θᵢ per oscillator per tick (rows are ticks).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PopulationActivity {
    pub rows: Vec<Vec<f64>>,
}

impl PopulationActivity {
    pub fn ticks(&self) -> usize {
        self.rows.len()
    }

    pub fn units(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Σᵢ wᵢ·xᵢ(t) for every tick.
    pub fn project(&self, weights: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().zip(weights).map(|(x, w)| x * w).sum())
            .collect()
    }
}

/// Cooperative cancellation, checked between outer ticks and sweep cells.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also fires once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    pub fn check(&self) -> QsfwResult<()> {
        if self.is_cancelled() {
            Err(QsfwError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Lifecycle of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initializing,
    Running { tick: usize },
    Completed,
}

/// One coupled run in progress.
pub struct Simulation {
    config: SimulationConfig,
    params: CouplingParameters,
    ops: Arc<LadderOperators>,
    rng: StdRng,
    state: QuantumState,
    network: OscillatorNetwork,
    phase: RunPhase,
    ticks: usize,
    quantum_series: Vec<f64>,
    neural_series: Vec<f64>,
    population: Option<PopulationActivity>,
}

impl Simulation {
    /// Initializing: validate, seed, draw the initial state and network.
    pub fn new(
        config: &SimulationConfig,
        params: &CouplingParameters,
        cache: &OperatorCache,
    ) -> QsfwResult<Self> {
        config.validate()?;
        params.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let ops = cache.get(config.dim)?;
        let state = quantum::init_state(config.dim, &mut rng)?;
        let network =
            OscillatorNetwork::init(config.network_size, config.phi, params.alpha, &mut rng)?;
        let ticks = config.tick_count();

        debug!(
            dim = config.dim,
            size = config.network_size,
            alpha = params.alpha,
            gamma = params.gamma,
            ticks,
            "initialised coupled run"
        );

        Ok(Self {
            config: config.clone(),
            params: *params,
            ops,
            rng,
            state,
            network,
            phase: RunPhase::Initializing,
            ticks,
            quantum_series: Vec::with_capacity(ticks),
            neural_series: Vec::with_capacity(ticks),
            population: None,
        })
    }

    /// Also record sin θᵢ of every oscillator at every tick.
    pub fn record_population(mut self) -> Self {
        self.population = Some(PopulationActivity {
            rows: Vec::with_capacity(self.ticks),
        });
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn network(&self) -> &OscillatorNetwork {
        &self.network
    }

    pub fn quantum_state(&self) -> &QuantumState {
        &self.state
    }

    /// Run one outer tick. Returns the recorded (observable, synchrony), or
    /// `None` once all ticks are done.
    pub fn step_tick(&mut self) -> QsfwResult<Option<(f64, f64)>> {
        let tick = self.quantum_series.len();
        if tick >= self.ticks {
            self.phase = RunPhase::Completed;
            return Ok(None);
        }
        self.phase = RunPhase::Running { tick };

        for _ in 0..self.config.quantum_substeps {
            let h = quantum::build_hamiltonian(&self.network, &self.ops);
            self.state = quantum::evolve(
                &self.state,
                &h,
                self.config.dt_quantum,
                self.params.gamma,
                &self.ops,
            )?;
        }
        let observable = quantum::measure_observable(&self.state, &self.ops);

        self.network = self
            .network
            .apply_drive(observable, &mut self.rng)
            .step(self.config.dt_network);
        let synchrony = self.network.synchrony_metric();

        self.quantum_series.push(observable);
        self.neural_series.push(synchrony);
        if let Some(pop) = self.population.as_mut() {
            pop.rows.push(self.network.activity());
        }

        debug!(tick, observable, synchrony, "tick");
        if tick + 1 == self.ticks {
            self.phase = RunPhase::Completed;
        }
        Ok(Some((observable, synchrony)))
    }

    /// Run every remaining tick and return the series (and population, if
    /// it was being recorded).
    pub fn run(
        mut self,
        cancel: &CancelToken,
    ) -> QsfwResult<(TimeSeriesPair, Option<PopulationActivity>)> {
        info!(
            alpha = self.params.alpha,
            gamma = self.params.gamma,
            ticks = self.ticks,
            "coupled run started"
        );
        while self.quantum_series.len() < self.ticks {
            cancel.check()?;
            self.step_tick()?;
        }
        self.phase = RunPhase::Completed;

        let (r, _) = self.network.order_parameter();
        info!(
            ticks = self.quantum_series.len(),
            purity = self.state.purity(),
            order = r,
            "coupled run completed"
        );

        let series = TimeSeriesPair {
            quantum: self.quantum_series,
            neural: self.neural_series,
            sample_interval: self.config.dt_network,
        };
        Ok((series, self.population))
    }
}

/// Run the coupled model once and return its two series.
pub fn run_simulation(
    config: &SimulationConfig,
    params: &CouplingParameters,
    cache: &OperatorCache,
    cancel: &CancelToken,
) -> QsfwResult<TimeSeriesPair> {
    Simulation::new(config, params, cache)?
        .run(cancel)
        .map(|(series, _)| series)
}

/// Anything that can produce a run for one parameter point.
///
/// The sweep is written against this so that other models (or canned series
/// in tests) can stand in for the coupled simulator.
pub trait Simulator: Send + Sync {
    fn simulate(
        &self,
        params: &CouplingParameters,
        seed: u64,
        cancel: &CancelToken,
    ) -> QsfwResult<TimeSeriesPair>;
}

impl<F> Simulator for F
where
    F: Fn(&CouplingParameters, u64) -> QsfwResult<TimeSeriesPair> + Send + Sync,
{
    fn simulate(
        &self,
        params: &CouplingParameters,
        seed: u64,
        cancel: &CancelToken,
    ) -> QsfwResult<TimeSeriesPair> {
        cancel.check()?;
        self(params, seed)
    }
}

/// The Lindblad–Kuramoto model behind a [`Simulator`].
#[derive(Debug, Clone)]
pub struct CoupledSimulator {
    config: SimulationConfig,
    cache: Arc<OperatorCache>,
}

impl CoupledSimulator {
    /// Validates the config and builds the operators for its dimension so
    /// concurrent runs only ever read the cache.
    pub fn new(config: SimulationConfig, cache: Arc<OperatorCache>) -> QsfwResult<Self> {
        config.validate()?;
        cache.prefill(&[config.dim])?;
        Ok(Self { config, cache })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<OperatorCache> {
        &self.cache
    }

    /// Run with population recording, for EEG generation.
    pub fn simulate_population(
        &self,
        params: &CouplingParameters,
        seed: u64,
        cancel: &CancelToken,
    ) -> QsfwResult<(TimeSeriesPair, PopulationActivity)> {
        let config = SimulationConfig {
            seed: Some(seed),
            ..self.config.clone()
        };
        let (series, population) = Simulation::new(&config, params, &self.cache)?
            .record_population()
            .run(cancel)?;
        Ok((series, population.unwrap_or_default()))
    }
}

impl Simulator for CoupledSimulator {
    fn simulate(
        &self,
        params: &CouplingParameters,
        seed: u64,
        cancel: &CancelToken,
    ) -> QsfwResult<TimeSeriesPair> {
        let config = SimulationConfig {
            seed: Some(seed),
            ..self.config.clone()
        };
        run_simulation(&config, params, &self.cache, cancel)
    }
}
