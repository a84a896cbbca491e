//! Critical ridge: for each alpha, the gamma that maximises coherence ×
//! integration.

use serde::{Deserialize, Serialize};

use crate::error::{QsfwError, QsfwResult};
use crate::sweep::{MetricGrid, SweepResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RidgePoint {
    pub alpha: f64,
    pub gamma: f64,
    /// Combined metric at (alpha, gamma).
    pub value: f64,
}

pub fn combined_metric(result: &SweepResult) -> QsfwResult<MetricGrid> {
    result.coherence.hadamard(&result.integration)
}

/// One point per alpha row, in row order.
pub fn find_ridge(result: &SweepResult) -> QsfwResult<Vec<RidgePoint>> {
    if result.gammas.is_empty() {
        return Err(QsfwError::invalid("cannot trace a ridge over an empty gamma axis"));
    }
    let combined = combined_metric(result)?;
    if combined.shape() != result.shape() {
        return Err(QsfwError::invalid(format!(
            "metric grids are {:?}, axes are {:?}",
            combined.shape(),
            result.shape()
        )));
    }
    let ridge = result
        .alphas
        .iter()
        .enumerate()
        .map(|(i, &alpha)| {
            let j = combined.argmax_row(i);
            RidgePoint {
                alpha,
                gamma: result.gammas[j],
                value: combined.get(i, j).unwrap_or(f64::NAN),
            }
        })
        .collect();
    Ok(ridge)
}

/// The point half-way along the ridge (element len/2).
pub fn ridge_midpoint(ridge: &[RidgePoint]) -> QsfwResult<RidgePoint> {
    ridge
        .get(ridge.len() / 2)
        .copied()
        .ok_or_else(|| QsfwError::invalid("ridge is empty"))
}
