//! Parameter sweep over the (alpha, gamma) plane.
//!
//! Every cell is an independent run with its own seed, so the cells can be
//! computed in any order (in parallel with the `parallel` feature) and the
//! grids come out identical. Results are assembled row-major after all cells
//! have finished; nothing is streamed.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{QsfwError, QsfwResult};
use crate::integration::{IntegrationMeasure, IntegrationPolicy};
use crate::operators::OperatorCache;
use crate::params::CouplingParameters;
use crate::simulation::{CancelToken, CoupledSimulator, SimulationConfig, Simulator};
use crate::spectral::{fractal_dimension, FrequencyBand};

/// Seed of cell 0; later cells are offset by a prime stride.
pub const DEFAULT_BASE_SEED: u64 = 42;
const SEED_STRIDE: u64 = 7919;

/// Dense row-major |alphas| × |gammas| grid of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricGrid {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl MetricGrid {
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            values: vec![value; rows * cols],
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> QsfwResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(QsfwError::invalid("grid rows have different lengths"));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            values: rows.into_iter().flatten().collect(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        (i < self.rows && j < self.cols).then(|| self.values[i * self.cols + j])
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) -> QsfwResult<()> {
        if i >= self.rows || j >= self.cols {
            return Err(QsfwError::invalid(format!(
                "cell ({}, {}) outside {}x{} grid",
                i, j, self.rows, self.cols
            )));
        }
        self.values[i * self.cols + j] = value;
        Ok(())
    }

    /// Row `i`, empty when out of range.
    pub fn row(&self, i: usize) -> &[f64] {
        if i >= self.rows {
            return &[];
        }
        &self.values[i * self.cols..(i + 1) * self.cols]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Element-wise product.
    pub fn hadamard(&self, other: &MetricGrid) -> QsfwResult<MetricGrid> {
        if self.shape() != other.shape() {
            return Err(QsfwError::invalid(format!(
                "grid shapes {:?} and {:?} differ",
                self.shape(),
                other.shape()
            )));
        }
        Ok(MetricGrid {
            rows: self.rows,
            cols: self.cols,
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| a * b)
                .collect(),
        })
    }

    /// Column of the largest value in row `i`; first occurrence wins and NaN
    /// never beats a number. An all-NaN row yields column 0.
    pub fn argmax_row(&self, i: usize) -> usize {
        let mut best: Option<(usize, f64)> = None;
        for (j, &v) in self.row(i).iter().enumerate() {
            if v.is_nan() {
                continue;
            }
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((j, v)),
            }
        }
        best.map_or(0, |(j, _)| j)
    }

    pub fn has_nan(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }
}

/// What a sweep does when a cell's run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Fill the cell with NaN and carry on. Only numerical instability and
    /// invalid cell parameters are absorbed; any other error aborts.
    #[default]
    MarkNan,
    /// Return the first failure in row-major order.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub alphas: Vec<f64>,
    pub gammas: Vec<f64>,
    pub g0: f64,
    /// Band for the fractal-dimension fit of each cell's neural series.
    pub fit_band: FrequencyBand,
    pub failure_policy: FailurePolicy,
    pub base_seed: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            alphas: default_alpha_grid(),
            gammas: default_gamma_grid(),
            g0: CouplingParameters::default().g0,
            fit_band: FrequencyBand::default(),
            failure_policy: FailurePolicy::default(),
            base_seed: DEFAULT_BASE_SEED,
        }
    }
}

impl SweepConfig {
    pub fn new(alphas: Vec<f64>, gammas: Vec<f64>, g0: f64) -> Self {
        Self {
            alphas,
            gammas,
            g0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> QsfwResult<()> {
        if self.alphas.is_empty() || self.gammas.is_empty() {
            return Err(QsfwError::invalid(format!(
                "sweep grids must be non-empty, got {} alphas and {} gammas",
                self.alphas.len(),
                self.gammas.len()
            )));
        }
        if self
            .alphas
            .iter()
            .chain(&self.gammas)
            .chain(std::iter::once(&self.g0))
            .any(|v| !v.is_finite())
        {
            return Err(QsfwError::invalid("sweep grids must be finite"));
        }
        // The sampling rate is only known once a run returns.
        self.fit_band.validate(f64::INFINITY)
    }

    pub fn cell_count(&self) -> usize {
        self.alphas.len() * self.gammas.len()
    }

    /// Seed of row-major cell `cell`.
    pub fn cell_seed(&self, cell: usize) -> u64 {
        self.base_seed
            .wrapping_add((cell as u64).wrapping_mul(SEED_STRIDE))
    }
}

/// The three metric maps over the swept grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub alphas: Vec<f64>,
    pub gammas: Vec<f64>,
    pub g0: f64,
    pub coherence: MetricGrid,
    pub fractal_dimension: MetricGrid,
    pub integration: MetricGrid,
    /// Cells whose run failed and were filled with NaN.
    pub failed_cells: Vec<(usize, usize)>,
}

impl SweepResult {
    /// Assemble a result, checking every grid matches the axes.
    pub fn new(
        alphas: Vec<f64>,
        gammas: Vec<f64>,
        g0: f64,
        coherence: MetricGrid,
        fractal_dimension: MetricGrid,
        integration: MetricGrid,
    ) -> QsfwResult<Self> {
        if alphas.is_empty() || gammas.is_empty() {
            return Err(QsfwError::invalid("sweep result axes must not be empty"));
        }
        let shape = (alphas.len(), gammas.len());
        for (name, grid) in [
            ("coherence", &coherence),
            ("fractal_dimension", &fractal_dimension),
            ("integration", &integration),
        ] {
            if grid.shape() != shape {
                return Err(QsfwError::invalid(format!(
                    "{} grid is {:?}, axes are {:?}",
                    name,
                    grid.shape(),
                    shape
                )));
            }
        }
        Ok(Self {
            alphas,
            gammas,
            g0,
            coherence,
            fractal_dimension,
            integration,
            failed_cells: Vec::new(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.alphas.len(), self.gammas.len())
    }
}

#[derive(Debug, Clone, Copy)]
struct CellMetrics {
    coherence: f64,
    fractal_dimension: f64,
    integration: f64,
}

fn run_cell<S, M>(
    config: &SweepConfig,
    simulator: &S,
    integration: &M,
    cancel: &CancelToken,
    cell: usize,
) -> QsfwResult<CellMetrics>
where
    S: Simulator + ?Sized,
    M: IntegrationMeasure + ?Sized,
{
    cancel.check()?;
    let (i, j) = (cell / config.gammas.len(), cell % config.gammas.len());
    let params = CouplingParameters::new(config.alphas[i], config.gammas[j], config.g0);
    let run = simulator.simulate(&params, config.cell_seed(cell), cancel)?;

    let metrics = CellMetrics {
        coherence: run.late_quantum_mean(),
        fractal_dimension: fractal_dimension(&run.neural, run.sampling_rate(), &config.fit_band),
        integration: integration.measure(&run),
    };
    debug!(
        i,
        j,
        alpha = params.alpha,
        gamma = params.gamma,
        coherence = metrics.coherence,
        fractal_dimension = metrics.fractal_dimension,
        integration = metrics.integration,
        "sweep cell done"
    );
    Ok(metrics)
}

/// Run `simulator` at every (alpha, gamma) cell and collect the three maps.
pub fn sweep<S, M>(
    config: &SweepConfig,
    simulator: &S,
    integration: &M,
    cancel: &CancelToken,
) -> QsfwResult<SweepResult>
where
    S: Simulator + ?Sized,
    M: IntegrationMeasure + ?Sized,
{
    config.validate()?;
    let (rows, cols) = (config.alphas.len(), config.gammas.len());
    info!(
        rows,
        cols,
        g0 = config.g0,
        measure = integration.name(),
        policy = ?config.failure_policy,
        "sweep started"
    );

    let cells = 0..config.cell_count();
    #[cfg(feature = "parallel")]
    let outcomes: Vec<QsfwResult<CellMetrics>> = cells
        .into_par_iter()
        .map(|cell| run_cell(config, simulator, integration, cancel, cell))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<QsfwResult<CellMetrics>> = cells
        .map(|cell| run_cell(config, simulator, integration, cancel, cell))
        .collect();

    let mut coherence = MetricGrid::filled(rows, cols, f64::NAN);
    let mut fractal = MetricGrid::filled(rows, cols, f64::NAN);
    let mut integrated = MetricGrid::filled(rows, cols, f64::NAN);
    let mut failed_cells = Vec::new();

    for (cell, outcome) in outcomes.into_iter().enumerate() {
        let (i, j) = (cell / cols, cell % cols);
        match outcome {
            Ok(m) => {
                coherence.set(i, j, m.coherence)?;
                fractal.set(i, j, m.fractal_dimension)?;
                integrated.set(i, j, m.integration)?;
            }
            Err(QsfwError::Cancelled) => return Err(QsfwError::Cancelled),
            Err(err)
                if config.failure_policy == FailurePolicy::MarkNan && err.is_cell_local() =>
            {
                warn!(
                    i,
                    j,
                    alpha = config.alphas[i],
                    gamma = config.gammas[j],
                    %err,
                    "sweep cell failed, marked NaN"
                );
                failed_cells.push((i, j));
            }
            Err(err) => return Err(err),
        }
    }

    let mut result = SweepResult::new(
        config.alphas.clone(),
        config.gammas.clone(),
        config.g0,
        coherence,
        fractal,
        integrated,
    )?;
    result.failed_cells = failed_cells;
    info!(
        cells = rows * cols,
        failed = result.failed_cells.len(),
        "sweep completed"
    );
    Ok(result)
}

/// Sweep the coupled model (T = 100, default settings) over the given grids.
pub fn parameter_sweep(alphas: &[f64], gammas: &[f64], g0: f64) -> QsfwResult<SweepResult> {
    let simulator = CoupledSimulator::new(SimulationConfig::for_sweep(), OperatorCache::global())?;
    let config = SweepConfig::new(alphas.to_vec(), gammas.to_vec(), g0);
    sweep(
        &config,
        &simulator,
        &IntegrationPolicy::default(),
        &CancelToken::new(),
    )
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|k| if k == n - 1 { stop } else { start + step * k as f64 })
                .collect()
        }
    }
}

/// `n` values from 10^start to 10^stop, evenly spaced in the exponent.
pub fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    linspace(start, stop, n)
        .into_iter()
        .map(|e| 10f64.powf(e))
        .collect()
}

pub fn default_alpha_grid() -> Vec<f64> {
    linspace(0.5, 2.5, 8)
}

pub fn default_gamma_grid() -> Vec<f64> {
    logspace(-4.0, 0.0, 8)
}
