//! Error types for the trim engine.

use thiserror::Error;

/// Result type alias using [`TrimError`].
pub type Result<T> = std::result::Result<T, TrimError>;

/// Errors raised by the monitor and its components.
///
/// Only `Config` is fatal. Operation errors are retried by the close executor
/// and never abort a cycle; the remaining variants abort the current cycle
/// and the scheduler moves on to the next tick.
#[derive(Error, Debug)]
pub enum TrimError {
    /// Invalid configuration detected before the first cycle
    #[error("Configuration error: {0}")]
    Config(String),

    /// A close attempt failed after all retries were consumed
    #[error("Close of position {position_id} failed after {attempts} attempt(s): {message}")]
    Operation {
        position_id: u64,
        attempts: u32,
        message: String,
    },

    /// The position snapshot supplied by the broker is inconsistent
    #[error("Malformed position snapshot: {0}")]
    MalformedSnapshot(String),

    /// Broker query (positions, price) failed
    #[error("Broker error: {0}")]
    Broker(#[from] anyhow::Error),
}

impl TrimError {
    /// Whether the error must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrimError::Config(_))
    }
}
