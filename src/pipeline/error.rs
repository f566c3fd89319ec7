//! Error types and reporting for pipeline stations.

use crate::error::HearkenError;
use std::fmt;

/// Outcome of a failed station step.
#[derive(Debug, Clone)]
pub enum StationError {
    /// The current batch is lost but the station keeps consuming input.
    Recoverable(String),
    /// The station cannot continue and shuts down.
    Fatal(String),
}

impl StationError {
    pub fn recoverable(err: impl fmt::Display) -> Self {
        StationError::Recoverable(err.to_string())
    }

    pub fn fatal(err: impl fmt::Display) -> Self {
        StationError::Fatal(err.to_string())
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::Recoverable(msg) => write!(f, "recoverable: {}", msg),
            StationError::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

impl std::error::Error for StationError {}

impl From<HearkenError> for StationError {
    /// Streaming-path inference failures are recoverable by policy: the
    /// stage drops its current batch and the stream continues.
    fn from(err: HearkenError) -> Self {
        StationError::Recoverable(err.to_string())
    }
}

/// Receives errors raised by running stations.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, station: &str, error: &StationError);
}

/// Default reporter: one stderr line per error.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        eprintln!("station {}: {}", station, error);
    }
}
