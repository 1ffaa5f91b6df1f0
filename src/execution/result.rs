//! Multiplexed run results.

use std::fmt;
use std::time::Duration;

/// Status reported for a run cancelled by an interrupt.
///
/// Outside 0..=255 so it can never be confused with a real exit code.
pub const INTERRUPTED_EXIT_CODE: i32 = 256;

/// Status reported for a run abandoned after an idle timeout.
pub const TIMED_OUT_EXIT_CODE: i32 = 257;

/// One of the child's output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamId {
    /// Standard output.
    Output,
    /// Standard error.
    Error,
}

impl StreamId {
    pub const ALL: [StreamId; 2] = [StreamId::Output, StreamId::Error];

    pub(crate) fn index(self) -> usize {
        match self {
            StreamId::Output => 0,
            StreamId::Error => 1,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamId::Output => write!(f, "stdout"),
            StreamId::Error => write!(f, "stderr"),
        }
    }
}

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The child exited. Death by signal `n` is reported as `128 + n`.
    Exited(i32),
    /// The run was cancelled before the child finished.
    Interrupted,
    /// No stream produced data within the idle timeout; the child was killed.
    TimedOut,
}

impl ExitStatus {
    /// Numeric status; sentinels for the non-exit variants.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Exited(code) => *code,
            ExitStatus::Interrupted => INTERRUPTED_EXIT_CODE,
            ExitStatus::TimedOut => TIMED_OUT_EXIT_CODE,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ExitStatus::Interrupted)
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, ExitStatus::TimedOut)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitStatus::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::Exited(128 + signal);
            }
        }

        ExitStatus::Exited(-1)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {}", code),
            ExitStatus::Interrupted => write!(f, "interrupted"),
            ExitStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of a multiplexed run.
#[derive(Debug, Clone)]
pub struct MultiplexOutcome {
    pub status: ExitStatus,
    /// Exit code that counts as success, if any.
    pub expected: Option<i32>,
    /// Retained stdout, when retention was requested.
    pub output: Option<String>,
    /// Retained stderr, when retention was requested.
    pub error: Option<String>,
    /// Wall time of the run.
    pub duration: Duration,
}

impl MultiplexOutcome {
    pub fn code(&self) -> i32 {
        self.status.code()
    }

    /// The child exited with the expected code (any code if none expected).
    pub fn is_success(&self) -> bool {
        match self.status {
            ExitStatus::Exited(code) => self.expected.map_or(true, |expected| expected == code),
            _ => false,
        }
    }

    pub fn failed(&self) -> bool {
        !self.is_success()
    }

    /// Retained stdout, or `""`.
    pub fn output_text(&self) -> &str {
        self.output.as_deref().unwrap_or("")
    }

    /// Retained stderr, or `""`.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}
