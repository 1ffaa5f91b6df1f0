//! Error types for logtee.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for logtee operations.
///
/// A child exiting with an unexpected code, being interrupted, or going idle
/// past its timeout is not an error: those outcomes are reported through
/// [`crate::execution::ExitStatus`].
#[derive(Error, Debug)]
pub enum LogteeError {
    /// The child process could not be started.
    #[error("failed to start '{program}': {source}")]
    Startup {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A sink file could not be opened.
    #[error("failed to open sink '{}': {source}", path.display())]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or flushing a sink (or the console) failed mid-run.
    #[error("sink write failed: {0}")]
    SinkWrite(#[source] std::io::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or argument error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl LogteeError {
    /// Build a startup error for `program`.
    pub fn startup(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Startup {
            program: program.into(),
            source,
        }
    }

    /// Build a sink-open error for `path`.
    pub fn sink_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SinkOpen {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the child never ran.
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::Startup { .. })
    }
}

/// Convenience Result type for logtee operations.
pub type Result<T> = std::result::Result<T, LogteeError>;
