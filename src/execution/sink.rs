//! Sinks and the stream-to-sink routing table.

use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use super::result::StreamId;
use crate::error::LogteeError;
use crate::Result;

/// Boxed synchronous writer used for the console and custom sinks.
pub type BoxedWriter = Box<dyn Write + Send>;

/// A destination for one or both child streams.
pub enum Sink {
    /// A file, opened in append or truncate mode for the run.
    Path(PathBuf),
    /// An already-open writer.
    Writer {
        label: String,
        writer: BoxedWriter,
    },
}

impl Sink {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Sink::Path(path.into())
    }

    pub fn writer(label: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        Sink::Writer {
            label: label.into(),
            writer: Box::new(writer),
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Sink::Writer { label, .. } => f.debug_struct("Writer").field("label", label).finish(),
        }
    }
}

/// Sinks bound to the child's stdout and stderr.
#[derive(Debug, Default)]
pub struct Sinks {
    pub output: Vec<Sink>,
    pub error: Vec<Sink>,
}

impl Sinks {
    /// No sinks: the console only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every path to both streams.
    pub fn tee<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        Self {
            output: paths.iter().cloned().map(Sink::Path).collect(),
            error: paths.into_iter().map(Sink::Path).collect(),
        }
    }

    pub fn with_output(mut self, sink: Sink) -> Self {
        self.output.push(sink);
        self
    }

    pub fn with_error(mut self, sink: Sink) -> Self {
        self.error.push(sink);
        self
    }
}

/// The console streams every chunk is teed to.
pub struct Console {
    pub output: BoxedWriter,
    pub error: BoxedWriter,
}

impl Console {
    /// This process's stdout and stderr.
    ///
    /// These are the blocking std handles: chunks are written inside the
    /// loop iteration that read them, before the next readiness wait.
    pub fn inherit() -> Self {
        Self {
            output: Box::new(io::stdout()),
            error: Box::new(io::stderr()),
        }
    }

    pub fn new(output: impl Write + Send + 'static, error: impl Write + Send + 'static) -> Self {
        Self {
            output: Box::new(output),
            error: Box::new(error),
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::inherit()
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkKind {
    Console,
    File,
    Writer,
}

struct SinkHandle {
    label: String,
    kind: SinkKind,
    writer: Option<BoxedWriter>,
    /// Set once a console stream failed; later chunks skip it.
    detached: bool,
}

impl SinkHandle {
    fn new(label: impl Into<String>, kind: SinkKind, writer: BoxedWriter) -> Self {
        Self {
            label: label.into(),
            kind,
            writer: Some(writer),
            detached: false,
        }
    }

    fn write_all(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.detached {
            return Ok(());
        }
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(chunk),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Console failures are not fatal: the console is dropped from the
    /// tee and file sinks keep receiving output. Other sinks propagate.
    fn check(&mut self, result: io::Result<()>) -> io::Result<()> {
        match result {
            Err(e) if self.kind == SinkKind::Console => {
                warn!(
                    sink = %self.label,
                    error = %e,
                    "console unavailable, continuing with file sinks"
                );
                self.writer = None;
                self.detached = true;
                Ok(())
            }
            other => other,
        }
    }

    /// Flush and release; later calls are no-ops.
    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => {
                trace!(sink = %self.label, "closing sink");
                writer.flush()
            }
            None => Ok(()),
        }
    }
}

/// Opened sinks plus, per stream, the ordered list of handles it feeds.
///
/// The console stream is always first in its route. A file bound to both
/// streams is opened once and shared. Dropping the table flushes and closes
/// every handle, so sinks are released on every exit path.
pub struct SinkTable {
    handles: Vec<SinkHandle>,
    routes: [Vec<usize>; 2],
}

impl SinkTable {
    /// Open every sink. Fails on the first file that cannot be opened.
    pub fn open(sinks: Sinks, console: Console, append: bool) -> Result<Self> {
        let mut table = Self {
            handles: Vec::new(),
            routes: [Vec::new(), Vec::new()],
        };
        let mut by_path: HashMap<PathBuf, usize> = HashMap::new();

        let console_out = table.push(SinkHandle::new(
            "console:stdout",
            SinkKind::Console,
            console.output,
        ));
        let console_err = table.push(SinkHandle::new(
            "console:stderr",
            SinkKind::Console,
            console.error,
        ));
        table.routes[StreamId::Output.index()].push(console_out);
        table.routes[StreamId::Error.index()].push(console_err);

        for (stream, list) in [(StreamId::Output, sinks.output), (StreamId::Error, sinks.error)] {
            for sink in list {
                let index = match sink {
                    Sink::Path(path) => match by_path.get(&path).copied() {
                        Some(index) => index,
                        None => {
                            let file = open_sink_file(&path, append)?;
                            let label = path.display().to_string();
                            let index = table.push(SinkHandle::new(
                                label,
                                SinkKind::File,
                                Box::new(BufWriter::new(file)),
                            ));
                            by_path.insert(path, index);
                            index
                        }
                    },
                    Sink::Writer { label, writer } => {
                        table.push(SinkHandle::new(label, SinkKind::Writer, writer))
                    }
                };
                let route = &mut table.routes[stream.index()];
                if !route.contains(&index) {
                    route.push(index);
                }
            }
        }

        debug!(
            sinks = table.handles.len(),
            stdout = table.routes[0].len(),
            stderr = table.routes[1].len(),
            "sink table opened"
        );
        Ok(table)
    }

    fn push(&mut self, handle: SinkHandle) -> usize {
        self.handles.push(handle);
        self.handles.len() - 1
    }

    /// Number of opened handles, console included.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Labels of the handles `stream` is written to, in order.
    pub fn route(&self, stream: StreamId) -> Vec<&str> {
        self.routes[stream.index()]
            .iter()
            .map(|&i| self.handles[i].label.as_str())
            .collect()
    }

    /// Write `chunk` to the console stream and every sink bound to `stream`.
    ///
    /// A failing console stream is detached with a warning; a failing sink
    /// is an error.
    pub fn write(&mut self, stream: StreamId, chunk: &[u8]) -> io::Result<()> {
        for &index in &self.routes[stream.index()] {
            let handle = &mut self.handles[index];
            let result = handle.write_all(chunk);
            handle.check(result)?;
        }
        Ok(())
    }

    /// Whether the console stream for `stream` is still being written.
    pub fn console_attached(&self, stream: StreamId) -> bool {
        self.routes[stream.index()]
            .iter()
            .map(|&i| &self.handles[i])
            .any(|handle| handle.kind == SinkKind::Console && !handle.detached)
    }

    /// Flush the writers bound to `stream`; sinks only when `sinks` is set.
    pub fn flush(&mut self, stream: StreamId, sinks: bool) -> io::Result<()> {
        for &index in &self.routes[stream.index()] {
            let handle = &mut self.handles[index];
            if sinks || handle.kind == SinkKind::Console {
                let result = handle.flush();
                handle.check(result)?;
            }
        }
        Ok(())
    }

    /// Flush and release every handle exactly once.
    ///
    /// All handles are closed even if one fails; the first error is returned.
    pub fn close(&mut self) -> io::Result<()> {
        let mut first_error = None;
        for handle in &mut self.handles {
            let result = handle.close();
            if let Err(e) = handle.check(result) {
                warn!(sink = %handle.label, error = %e, "failed to flush sink");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for SinkTable {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for SinkTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkTable")
            .field("stdout", &self.route(StreamId::Output))
            .field("stderr", &self.route(StreamId::Error))
            .finish()
    }
}

fn open_sink_file(path: &Path, append: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options
        .open(path)
        .map_err(|source| LogteeError::sink_open(path, source))
}
