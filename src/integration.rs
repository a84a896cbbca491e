//! Integration measures: how strongly the quantum and neural series of a run
//! depend on each other.
//!
//! The measure is a policy. The default is a plug-in mutual-information
//! estimate on an equal-width 2-D histogram, reported in bits; |Pearson r| is
//! offered as a cheaper proxy. Integrated information Φ has a name but no
//! estimator.

use serde::{Deserialize, Serialize};

use crate::error::{QsfwError, QsfwResult};
use crate::simulation::TimeSeriesPair;

/// Default histogram resolution per axis.
pub const DEFAULT_BINS: usize = 16;

/// A scalar summary of coupling between the two series of a run.
pub trait IntegrationMeasure: Send + Sync {
    /// Always finite and ≥ 0. Degenerate input (fewer than two samples, a
    /// constant series, a NaN or infinite sample) measures 0.
    fn measure(&self, run: &TimeSeriesPair) -> f64;

    fn name(&self) -> &'static str;
}

/// Built-in integration measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum IntegrationPolicy {
    MutualInformation { bins: usize },
    Correlation,
}

impl Default for IntegrationPolicy {
    fn default() -> Self {
        IntegrationPolicy::MutualInformation { bins: DEFAULT_BINS }
    }
}

impl IntegrationPolicy {
    /// Look a policy up by its CLI name.
    pub fn from_name(name: &str) -> QsfwResult<Self> {
        match name {
            "mutual-information" | "mi" => Ok(Self::default()),
            "correlation" => Ok(IntegrationPolicy::Correlation),
            "phi" => Err(QsfwError::Unimplemented("integrated information (phi)")),
            other => Err(QsfwError::invalid(format!(
                "unknown integration measure '{}'",
                other
            ))),
        }
    }

    pub fn validate(&self) -> QsfwResult<()> {
        match self {
            IntegrationPolicy::MutualInformation { bins } if *bins < 2 => Err(
                QsfwError::invalid(format!("mutual information needs >= 2 bins, got {}", bins)),
            ),
            _ => Ok(()),
        }
    }
}

impl IntegrationMeasure for IntegrationPolicy {
    fn measure(&self, run: &TimeSeriesPair) -> f64 {
        match *self {
            IntegrationPolicy::MutualInformation { bins } => {
                MutualInformation { bins }.measure(run)
            }
            IntegrationPolicy::Correlation => AbsCorrelation.measure(run),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            IntegrationPolicy::MutualInformation { .. } => "mutual-information",
            IntegrationPolicy::Correlation => "correlation",
        }
    }
}

/// Histogram mutual information I(Q; N) in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutualInformation {
    pub bins: usize,
}

impl Default for MutualInformation {
    fn default() -> Self {
        Self { bins: DEFAULT_BINS }
    }
}

impl IntegrationMeasure for MutualInformation {
    fn measure(&self, run: &TimeSeriesPair) -> f64 {
        let n = run.quantum.len().min(run.neural.len());
        if n < 2 || self.bins < 2 {
            return 0.0;
        }
        let (Some(qx), Some(nx)) = (
            bin_indices(&run.quantum[..n], self.bins),
            bin_indices(&run.neural[..n], self.bins),
        ) else {
            return 0.0;
        };

        let b = self.bins;
        let mut joint = vec![0usize; b * b];
        let mut marginal_q = vec![0usize; b];
        let mut marginal_n = vec![0usize; b];
        for (&i, &j) in qx.iter().zip(&nx) {
            joint[i * b + j] += 1;
            marginal_q[i] += 1;
            marginal_n[j] += 1;
        }

        let total = n as f64;
        let mut mi = 0.0;
        for i in 0..b {
            for j in 0..b {
                let c = joint[i * b + j];
                if c == 0 {
                    continue;
                }
                let pxy = c as f64 / total;
                let px = marginal_q[i] as f64 / total;
                let py = marginal_n[j] as f64 / total;
                mi += pxy * (pxy / (px * py)).log2();
            }
        }
        // Rounding can leave a tiny negative on independent input.
        mi.max(0.0)
    }

    fn name(&self) -> &'static str {
        "mutual-information"
    }
}

/// |Pearson r| between the two series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsCorrelation;

impl IntegrationMeasure for AbsCorrelation {
    fn measure(&self, run: &TimeSeriesPair) -> f64 {
        let n = run.quantum.len().min(run.neural.len());
        if n < 2 {
            return 0.0;
        }
        let (xs, ys) = (&run.quantum[..n], &run.neural[..n]);
        let mean_x = xs.iter().sum::<f64>() / n as f64;
        let mean_y = ys.iter().sum::<f64>() / n as f64;
        let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
        for (x, y) in xs.iter().zip(ys) {
            let (dx, dy) = (x - mean_x, y - mean_y);
            sxy += dx * dy;
            sxx += dx * dx;
            syy += dy * dy;
        }
        if sxx <= 0.0 || syy <= 0.0 {
            return 0.0;
        }
        let r = (sxy / (sxx * syy).sqrt()).abs();
        if r.is_finite() {
            r.min(1.0)
        } else {
            0.0
        }
    }

    fn name(&self) -> &'static str {
        "correlation"
    }
}

/// Default integration measure of a run.
pub fn integration_measure(run: &TimeSeriesPair) -> f64 {
    MutualInformation::default().measure(run)
}

/// Equal-width bin index of every sample, or `None` for a constant or
/// non-finite series.
fn bin_indices(series: &[f64], bins: usize) -> Option<Vec<usize>> {
    if series.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let (lo, hi) = series
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    let width = hi - lo;
    if !(width.is_finite() && width > 0.0) {
        return None;
    }
    Some(
        series
            .iter()
            .map(|&x| (((x - lo) / width * bins as f64) as usize).min(bins - 1))
            .collect(),
    )
}
