//! Error taxonomy for homee-sday.
//!
//! Every error is terminal: it is printed once and the process exits with
//! status 1. The variants only exist so callers and tests can tell the
//! categories apart.

use thiserror::Error;

/// Errors that end a homee-sday run.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed command-line arguments.
    #[error("{0}")]
    Usage(String),

    /// Missing or out-of-range entries in the config file.
    #[error("{0}")]
    Config(String),

    /// The sleep-time text could not be interpreted.
    #[error("{0}")]
    Input(String),

    /// The hub could not be reached or refused the session.
    #[error("Couldn't connect to Homee.\n{0}")]
    Connection(String),

    /// The session closed while a response was still expected.
    #[error("Connection to Homee lost. Try again quicker.")]
    ConnectionLost,

    /// The hub answered with something other than what was expected.
    #[error("{0}")]
    Protocol(String),

    /// The watchdog expired before the expected message arrived.
    #[error("Timeout duration elapsed before getting expected response from Homee.")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
