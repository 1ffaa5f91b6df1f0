//! Per-line time prefixes for teed output.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveTime};

use super::result::StreamId;

/// Which time prefixes go in front of each output line.
///
/// With both enabled the elapsed time comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamps {
    /// Seconds since the child was started.
    pub elapsed: bool,
    /// Local time of day.
    pub wallclock: bool,
}

impl Timestamps {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_elapsed(mut self, enabled: bool) -> Self {
        self.elapsed = enabled;
        self
    }

    pub fn with_wallclock(mut self, enabled: bool) -> Self {
        self.wallclock = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.elapsed || self.wallclock
    }

    /// Render the prefix for a line seen `elapsed` into the run at `clock`.
    pub fn prefix(&self, elapsed: Duration, clock: NaiveTime) -> String {
        let mut prefix = String::new();
        if self.elapsed {
            prefix.push_str(&format!("{:9.3} ", elapsed.as_secs_f64()));
        }
        if self.wallclock {
            prefix.push_str(&clock.format("%H:%M:%S%.3f ").to_string());
        }
        prefix
    }
}

/// Inserts a time prefix at the start of every line, tracking line starts
/// separately for stdout and stderr so chunks may end mid-line.
#[derive(Debug)]
pub struct LineStamper {
    stamps: Timestamps,
    start: Instant,
    at_line_start: [bool; 2],
}

impl LineStamper {
    pub fn new(stamps: Timestamps, start: Instant) -> Self {
        Self {
            stamps,
            start,
            at_line_start: [true; 2],
        }
    }

    /// Replace `out` with `chunk`, prefixed at every line start. All lines
    /// of one chunk share a timestamp.
    pub fn stamp(&mut self, stream: StreamId, chunk: &[u8], out: &mut Vec<u8>) {
        let prefix = self
            .stamps
            .prefix(self.start.elapsed(), Local::now().time());
        self.stamp_with(stream, chunk, prefix.as_bytes(), out);
    }

    fn stamp_with(&mut self, stream: StreamId, chunk: &[u8], prefix: &[u8], out: &mut Vec<u8>) {
        out.clear();
        let at_start = &mut self.at_line_start[stream.index()];
        for line in chunk.split_inclusive(|&b| b == b'\n') {
            if *at_start {
                out.extend_from_slice(prefix);
            }
            out.extend_from_slice(line);
            *at_start = line.ends_with(b"\n");
        }
    }
}
