//! `qsfw`: command-line front end for the coupled simulator.
//!
//! # Usage
//!
//! ```bash
//! qsfw smoke --alpha 1.2 --gamma 0.01 --seed 7
//! qsfw sweep --config experiment.json --json sweep.json
//! qsfw eeg --alpha 1.2 --gamma 0.01 --json eeg.json
//! qsfw classify --alpha 1.2 --gamma 0.5
//! qsfw notebook --alpha 1.2 --gamma 0.01 --g0 0.5
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use qsfw_sim::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "qsfw")]
#[command(about = "Quantum-spectral-fractal weaving simulator")]
struct Args {
    /// Experiment configuration (JSON). Missing fields take defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the command's result as pretty JSON to this file.
    #[arg(long, global = true)]
    json: Option<PathBuf>,

    /// Integration measure: mutual-information, correlation.
    #[arg(long, global = true)]
    integration: Option<String>,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One coupled run with its summary metrics.
    Smoke {
        #[arg(long, default_value_t = 1.2)]
        alpha: f64,
        #[arg(long, default_value_t = 0.01)]
        gamma: f64,
        #[arg(long)]
        duration: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Sweep the (alpha, gamma) grid and trace the critical ridge.
    Sweep {
        /// Override the alpha grid (comma separated).
        #[arg(long, value_delimiter = ',')]
        alphas: Option<Vec<f64>>,
        /// Override the gamma grid (comma separated).
        #[arg(long, value_delimiter = ',')]
        gammas: Option<Vec<f64>>,
        #[arg(long)]
        g0: Option<f64>,
        /// Abort on the first failing cell instead of marking it NaN.
        #[arg(long)]
        abort_on_failure: bool,
    },
    /// Simulated EEG at the ridge midpoint (or at an explicit point).
    Eeg {
        #[arg(long, requires = "gamma")]
        alpha: Option<f64>,
        #[arg(long, requires = "alpha")]
        gamma: Option<f64>,
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Hypothesised conscious state of a parameter set.
    Classify {
        #[arg(long)]
        alpha: Option<f64>,
        #[arg(long)]
        gamma: Option<f64>,
    },
    /// Run once and print a lab-notebook entry.
    Notebook {
        #[arg(long, default_value_t = 1.2)]
        alpha: f64,
        #[arg(long, default_value_t = 0.01)]
        gamma: f64,
        #[arg(long, default_value_t = 0.5)]
        g0: f64,
    },
}

#[derive(Serialize)]
struct SmokeReport {
    params: CouplingParameters,
    ticks: usize,
    late_coherence: f64,
    fractal_dimension: f64,
    integration: f64,
    series: TimeSeriesPair,
}

#[derive(Serialize)]
struct SweepReport {
    sweep: SweepResult,
    ridge: Vec<RidgePoint>,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "results written");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    if let Some(name) = &args.integration {
        config.integration = IntegrationPolicy::from_name(name)?;
    }

    let cache = OperatorCache::global();
    let cancel = CancelToken::new();

    match args.command {
        Command::Smoke {
            alpha,
            gamma,
            duration,
            seed,
        } => {
            let params = CouplingParameters {
                alpha,
                gamma,
                ..CouplingParameters::default()
            };
            let mut sim = config.simulation.clone();
            if let Some(d) = duration {
                sim.duration = d;
            }
            sim.seed = seed.or(sim.seed);
            let series = run_simulation(&sim, &params, &cache, &cancel)?;
            let report = SmokeReport {
                params,
                ticks: series.len(),
                late_coherence: series.late_quantum_mean(),
                fractal_dimension: fractal_dimension(
                    &series.neural,
                    series.sampling_rate(),
                    &config.sweep.fit_band,
                ),
                integration: config.integration.measure(&series),
                series,
            };
            println!(
                "ticks={} late_coherence={:.6} fractal_dimension={:.4} {}={:.4}",
                report.ticks,
                report.late_coherence,
                report.fractal_dimension,
                config.integration.name(),
                report.integration
            );
            if let Some(path) = &args.json {
                write_json(path, &report)?;
            }
        }
        Command::Sweep {
            alphas,
            gammas,
            g0,
            abort_on_failure,
        } => {
            let mut sweep_config = config.sweep.clone();
            if let Some(a) = alphas {
                sweep_config.alphas = a;
            }
            if let Some(g) = gammas {
                sweep_config.gammas = g;
            }
            if let Some(g0) = g0 {
                sweep_config.g0 = g0;
            }
            if abort_on_failure {
                sweep_config.failure_policy = FailurePolicy::Abort;
            }
            let simulator = CoupledSimulator::new(
                SimulationConfig {
                    duration: SWEEP_DURATION,
                    ..config.simulation.clone()
                },
                cache,
            )?;
            let result = sweep(&sweep_config, &simulator, &config.integration, &cancel)?;
            let ridge = find_ridge(&result)?;
            for p in &ridge {
                println!(
                    "alpha={:.4} gamma={:.6} coherence*integration={:.6}",
                    p.alpha, p.gamma, p.value
                );
            }
            if !result.failed_cells.is_empty() {
                println!("{} cell(s) failed and were marked NaN", result.failed_cells.len());
            }
            if let Some(path) = &args.json {
                write_json(
                    path,
                    &SweepReport {
                        sweep: result,
                        ridge,
                    },
                )?;
            }
        }
        Command::Eeg {
            alpha,
            gamma,
            duration,
        } => {
            let ridge = match (alpha, gamma) {
                (Some(alpha), Some(gamma)) => vec![RidgePoint {
                    alpha,
                    gamma,
                    value: f64::NAN,
                }],
                _ => {
                    let simulator = CoupledSimulator::new(
                        SimulationConfig {
                            duration: SWEEP_DURATION,
                            ..config.simulation.clone()
                        },
                        cache.clone(),
                    )?;
                    let result = sweep(&config.sweep, &simulator, &config.integration, &cancel)?;
                    find_ridge(&result)?
                }
            };
            let mut eeg_config = config.eeg.clone();
            if let Some(d) = duration {
                eeg_config.duration = d;
            }
            let eeg = generate_simulated_eeg(&ridge, &config.simulation, cache, &eeg_config, &cancel)?;
            match eeg.fit {
                Some(fit) => println!(
                    "alpha={:.4} gamma={:.6} channels={} beta={:.4} fractal_dimension={:.4}",
                    eeg.alpha,
                    eeg.gamma,
                    eeg.channel_count(),
                    fit.beta,
                    eeg.fractal_dimension
                ),
                None => println!(
                    "alpha={:.4} gamma={:.6} channels={} (no power-law fit in band)",
                    eeg.alpha,
                    eeg.gamma,
                    eeg.channel_count()
                ),
            }
            if let Some(path) = &args.json {
                write_json(path, &eeg)?;
            }
        }
        Command::Classify { alpha, gamma } => {
            let state = classify(&ParameterSet {
                alpha,
                gamma,
                g0: None,
            });
            println!("{state}");
            if let Some(path) = &args.json {
                write_json(path, &state)?;
            }
        }
        Command::Notebook { alpha, gamma, g0 } => {
            let params = CouplingParameters::new(alpha, gamma, g0);
            let series = run_simulation(&config.simulation, &params, &cache, &cancel)?;
            let summary = ResultsSummary {
                mean_coherence: series.late_quantum_mean(),
                fractal_dimension: fractal_dimension(
                    &series.neural,
                    series.sampling_rate(),
                    &config.sweep.fit_band,
                ),
                integration_measure: config.integration.measure(&series),
                stability_time: None,
            };
            let entry = build_notebook_entry(params.into(), summary);
            println!("{}", entry.to_json_pretty()?);
            if let Some(path) = &args.json {
                write_json(path, &entry)?;
            }
        }
    }

    Ok(())
}
