//! Manest error types.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ManestError {
    /// Missing, unparsable, or out-of-range configuration.
    Config(String),
    /// An artifact exists but cannot be trusted (bad frame, bad payload, wrong shape).
    CorruptArtifact { path: PathBuf, reason: String },
    DimensionMismatch { expected: usize, got: usize },
    /// No usable training text was found.
    EmptyCorpus(String),
    /// Prediction requested before the readout was fitted.
    Untrained,
    /// Physics parameters changed after the reservoir weights were restored.
    Reconfigure(String),
    Numerical(String),
    InvalidInput(String),
    Io(io::Error),
}

impl fmt::Display for ManestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "ConfigError: {msg}"),
            Self::CorruptArtifact { path, reason } => {
                write!(f, "CorruptArtifact: {}: {reason}", path.display())
            }
            Self::DimensionMismatch { expected, got } => {
                write!(f, "DimensionMismatch: expected {expected}, got {got}")
            }
            Self::EmptyCorpus(msg) => write!(f, "EmptyCorpus: {msg}"),
            Self::Untrained => write!(f, "Untrained: readout has not been fitted, run `manest train` first"),
            Self::Reconfigure(msg) => write!(f, "ReconfigureError: {msg}"),
            Self::Numerical(msg) => write!(f, "NumericalError: {msg}"),
            Self::InvalidInput(msg) => write!(f, "InvalidInput: {msg}"),
            Self::Io(err) => write!(f, "IoError: {err}"),
        }
    }
}

impl std::error::Error for ManestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ManestError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl ManestError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact { path: path.into(), reason: reason.into() }
    }

    /// Whether the CLI should treat this as a warning rather than a failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmptyCorpus(_) | Self::Untrained)
    }
}

pub type Result<T> = std::result::Result<T, ManestError>;
