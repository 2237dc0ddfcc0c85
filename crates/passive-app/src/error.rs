//! Error type for the scanner binary.

use thiserror::Error;

use passive_core::CoreError;
use passive_proxy::{CaError, ProxyError};

/// Why a run (or a CA generation) ended.
///
/// [`RunError::Timeout`] and [`RunError::Cancelled`] are the normal ends
/// of a run; everything else is a failure.
#[derive(Debug, Error)]
pub enum RunError {
    /// The maximum run time elapsed.
    #[error("running timeout")]
    Timeout,

    /// The operator interrupted the run.
    #[error("user cancel")]
    Cancelled,

    /// Invalid command-line configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// CA generation or loading failed.
    #[error(transparent)]
    Ca(#[from] CaError),

    /// The proxy could not be started.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// Returns true for the expected ends of a run.
    pub fn is_termination(&self) -> bool {
        matches!(self, RunError::Timeout | RunError::Cancelled)
    }
}
