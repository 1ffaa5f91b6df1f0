//! Multiplexer options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::stamp::Timestamps;

/// Default bytes read per readiness event.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Which writers are flushed after every chunk in unbuffered mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlushScope {
    /// Only the console streams.
    ConsoleOnly,
    /// The console streams and every sink bound to the stream.
    #[default]
    ConsoleAndSinks,
}

/// Options for one multiplexed run.
///
/// Built once with the `with_*` methods and then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplexOptions {
    /// Exit code that counts as success; `None` accepts any code.
    pub expected_exit: Option<i32>,
    /// Upper bound for each readiness wait. A child that stays silent
    /// longer than this is killed.
    pub idle_timeout: Option<Duration>,
    /// When false, writers are flushed after every chunk (see `flush_scope`).
    pub buffered: bool,
    pub flush_scope: FlushScope,
    /// Keep a copy of stdout/stderr in memory for the outcome.
    pub retain: bool,
    /// Open sink files in append mode instead of truncating them.
    pub append: bool,
    /// Kill the child when the run is interrupted.
    pub kill_on_interrupt: bool,
    pub chunk_size: usize,
    /// Time prefixes put in front of every teed line.
    pub timestamps: Timestamps,
}

impl MultiplexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expected_exit(mut self, code: Option<i32>) -> Self {
        self.expected_exit = code;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_buffered(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    pub fn with_flush_scope(mut self, scope: FlushScope) -> Self {
        self.flush_scope = scope;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn with_kill_on_interrupt(mut self, kill: bool) -> Self {
        self.kill_on_interrupt = kill;
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_timestamps(mut self, timestamps: Timestamps) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Whether sinks (not just the console) are flushed after each chunk.
    pub fn flushes_sinks(&self) -> bool {
        !self.buffered && self.flush_scope == FlushScope::ConsoleAndSinks
    }

    /// Whether the console is flushed after each chunk.
    pub fn flushes_console(&self) -> bool {
        !self.buffered
    }
}

impl Default for MultiplexOptions {
    fn default() -> Self {
        Self {
            expected_exit: Some(0),
            idle_timeout: None,
            buffered: true,
            flush_scope: FlushScope::default(),
            retain: false,
            append: false,
            kill_on_interrupt: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timestamps: Timestamps::default(),
        }
    }
}
