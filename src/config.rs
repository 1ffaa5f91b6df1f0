//! Configuration management for logtee.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::execution::{FlushScope, MultiplexOptions, DEFAULT_CHUNK_SIZE};
use crate::output::NormalizeOptions;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process multiplexing settings.
    pub multiplex: MultiplexSection,
    /// Text normalization settings.
    pub normalize: NormalizeOptions,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Multiplexer configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexSection {
    /// Kill the child after this many seconds without output (0 = never).
    pub idle_timeout_secs: u64,
    /// Leave flushing to the writers' own buffering.
    pub buffered: bool,
    /// What gets flushed per chunk when unbuffered.
    pub flush_scope: FlushScope,
    /// Kill the child on Ctrl-C instead of leaving it running.
    pub kill_on_interrupt: bool,
    /// Bytes read per readiness event.
    pub chunk_size: usize,
}

impl Default for MultiplexSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 0,
            buffered: true,
            flush_scope: FlushScope::default(),
            kill_on_interrupt: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(timeout) = std::env::var("LOGTEE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.multiplex.idle_timeout_secs = secs;
            }
        }

        if let Ok(level) = std::env::var("LOGTEE_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(secs) = args.timeout {
            self.multiplex.idle_timeout_secs = secs;
        }

        if args.unbuffered {
            self.multiplex.buffered = false;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        } else if let Some(level) = args.verbosity().log_level() {
            self.logging.level = level.to_string();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Multiplexer options for a run; `append` comes from the invocation.
    pub fn multiplex_options(&self, append: bool) -> MultiplexOptions {
        let timeout = match self.multiplex.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        MultiplexOptions::default()
            .with_expected_exit(Some(0))
            .with_idle_timeout(timeout)
            .with_buffered(self.multiplex.buffered)
            .with_flush_scope(self.multiplex.flush_scope)
            .with_kill_on_interrupt(self.multiplex.kill_on_interrupt)
            .with_chunk_size(self.multiplex.chunk_size)
            .with_append(append)
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        self.normalize
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::LogteeError {
    fn from(e: ConfigError) -> Self {
        crate::LogteeError::Config(e.to_string())
    }
}
