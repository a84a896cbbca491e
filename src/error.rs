//! Error hierarchy for the coupled simulator.
//!
//! Every fallible operation in the crate returns [`QsfwResult`]. Nothing is
//! retried: a failure inside a run abandons that run and surfaces to whoever
//! called the driver or the sweep.

use thiserror::Error;

/// Root error type for all simulator failures.
#[derive(Error, Debug)]
pub enum QsfwError {
    /// Bad dimension, empty grid, malformed parameter set or band.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Trace/norm drift beyond tolerance, or a degenerate log-log fit.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    /// A collaborator that has no implementation in this crate.
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),

    /// A cancellation token fired (explicit cancel or deadline).
    #[error("run cancelled")]
    Cancelled,

    /// Experiment configuration failed to parse or validate.
    #[error("config error: {0}")]
    Config(String),

    /// Reading a config file or writing results failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type QsfwResult<T> = Result<T, QsfwError>;

impl QsfwError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        QsfwError::InvalidArgument(msg.into())
    }

    pub(crate) fn unstable(msg: impl Into<String>) -> Self {
        QsfwError::NumericalInstability(msg.into())
    }

    /// True for the error kinds a sweep may absorb into a NaN cell.
    pub fn is_cell_local(&self) -> bool {
        matches!(
            self,
            QsfwError::NumericalInstability(_) | QsfwError::InvalidArgument(_)
        )
    }
}
