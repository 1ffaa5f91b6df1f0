//! The readiness-driven multiplex loop.

use std::future::{pending, Future};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tracing::{debug, info, trace, warn};

use super::command::Command;
use super::options::MultiplexOptions;
use super::result::{ExitStatus, MultiplexOutcome, StreamId};
use super::sink::{Console, SinkTable, Sinks};
use super::stamp::LineStamper;
use crate::error::LogteeError;
use crate::Result;

/// Boxed async reader feeding the child's stdin.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// What feeds the child's standard input.
#[derive(Default)]
pub enum Input {
    /// Forward this process's stdin.
    #[default]
    Inherit,
    /// The child gets an empty stdin.
    Null,
    /// Forward an arbitrary reader.
    Reader(BoxedReader),
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::Inherit => write!(f, "Inherit"),
            Input::Null => write!(f, "Null"),
            Input::Reader(_) => write!(f, "Reader(..)"),
        }
    }
}

/// Runs a command, teeing its output to the console and to sinks.
#[derive(Debug)]
pub struct Multiplexer {
    options: MultiplexOptions,
    console: Console,
    input: Input,
}

/// How long output is still drained once the child has exited. Streams
/// held open by a background grandchild are abandoned after this much
/// silence.
const DRAIN_WINDOW: Duration = Duration::from_millis(50);

enum Event {
    Input(std::io::Result<usize>),
    Forwarded(std::io::Result<usize>),
    Read(StreamId, std::io::Result<usize>),
    Exited(std::io::Result<std::process::ExitStatus>),
    Idle,
    Cancelled,
}

/// Per-stream in-memory copies, present only when retention is on.
#[derive(Default)]
struct Retained {
    output: Option<Vec<u8>>,
    error: Option<Vec<u8>>,
}

impl Retained {
    fn new(enabled: bool) -> Self {
        if enabled {
            Self {
                output: Some(Vec::new()),
                error: Some(Vec::new()),
            }
        } else {
            Self::default()
        }
    }

    fn append(&mut self, stream: StreamId, chunk: &[u8]) {
        let buffer = match stream {
            StreamId::Output => self.output.as_mut(),
            StreamId::Error => self.error.as_mut(),
        };
        if let Some(buffer) = buffer {
            buffer.extend_from_slice(chunk);
        }
    }

    fn into_texts(self) -> (Option<String>, Option<String>) {
        let text = |bytes: Vec<u8>| String::from_utf8_lossy(&bytes).into_owned();
        (self.output.map(text), self.error.map(text))
    }
}

impl Multiplexer {
    /// Create a multiplexer writing to this process's console.
    pub fn new(options: MultiplexOptions) -> Self {
        Self {
            options,
            console: Console::inherit(),
            input: Input::Inherit,
        }
    }

    /// Replace the console streams.
    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Choose what feeds the child's stdin.
    pub fn with_input(mut self, input: Input) -> Self {
        self.input = input;
        self
    }

    pub fn options(&self) -> &MultiplexOptions {
        &self.options
    }

    /// Run `command` to completion; Ctrl-C interrupts the run.
    ///
    /// # Errors
    ///
    /// [`LogteeError::Startup`] if the program cannot be started,
    /// [`LogteeError::SinkOpen`] if a sink cannot be opened (the child is
    /// not started), [`LogteeError::SinkWrite`] if writing a sink fails.
    pub async fn run(self, command: &Command, sinks: Sinks) -> Result<MultiplexOutcome> {
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                pending::<()>().await;
            }
        };
        self.run_until(command, sinks, interrupt).await
    }

    /// Run `command` to completion, treating `cancel` completing as an
    /// interrupt.
    ///
    /// Sinks are flushed and closed on every path.
    pub async fn run_until<F>(
        self,
        command: &Command,
        sinks: Sinks,
        cancel: F,
    ) -> Result<MultiplexOutcome>
    where
        F: Future<Output = ()>,
    {
        let Multiplexer {
            options,
            console,
            input,
        } = self;
        let start = Instant::now();

        let program = command
            .resolve_program()
            .map_err(|e| LogteeError::startup(&command.program, e))?;

        let mut table = SinkTable::open(sinks, console, options.append)?;

        let mut child = spawn(command, &program, &input)
            .map_err(|e| LogteeError::startup(&command.program, e))?;
        info!(command = %command.command_line(), pid = ?child.id(), "child started");

        let mut retained = Retained::new(options.retain);
        let input = match input {
            Input::Inherit => Some(Box::new(tokio::io::stdin()) as BoxedReader),
            Input::Null => None,
            Input::Reader(reader) => Some(reader),
        };

        let loop_result = pump(
            &mut child,
            input,
            &mut table,
            &mut retained,
            &options,
            start,
            cancel,
        )
        .await;
        let close_result = table.close();
        let status = loop_result?;
        close_result.map_err(LogteeError::SinkWrite)?;

        let (output, error) = retained.into_texts();
        let outcome = MultiplexOutcome {
            status,
            expected: options.expected_exit,
            output,
            error,
            duration: start.elapsed(),
        };

        if outcome.failed() {
            warn!(
                command = %command.command_line(),
                status = %outcome.status,
                expected = ?outcome.expected,
                "command did not succeed"
            );
        } else {
            debug!(status = %outcome.status, elapsed = ?outcome.duration, "command finished");
        }
        Ok(outcome)
    }
}

fn spawn(command: &Command, program: &std::path::Path, input: &Input) -> std::io::Result<Child> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(&command.args)
        .envs(&command.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(match input {
            Input::Null => Stdio::null(),
            _ => Stdio::piped(),
        });
    if let Some(dir) = &command.working_dir {
        cmd.current_dir(dir);
    }
    cmd.spawn()
}

async fn read_from<R>(reader: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader.as_mut() {
        Some(reader) => reader.read(buf).await,
        None => pending().await,
    }
}

async fn write_to(writer: &mut Option<ChildStdin>, buf: &[u8]) -> std::io::Result<usize> {
    match writer.as_mut() {
        Some(writer) => writer.write(buf).await,
        None => pending().await,
    }
}

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => pending().await,
    }
}

/// Input read from the parent but not yet accepted by the child's stdin.
#[derive(Default)]
struct PendingInput {
    buf: Vec<u8>,
    at: usize,
}

impl PendingInput {
    fn is_empty(&self) -> bool {
        self.at >= self.buf.len()
    }

    fn remaining(&self) -> &[u8] {
        &self.buf[self.at.min(self.buf.len())..]
    }

    fn fill(&mut self, data: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(data);
        self.at = 0;
    }

    fn consume(&mut self, n: usize) {
        self.at += n;
        if self.is_empty() {
            self.clear();
        }
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.at = 0;
    }
}

/// The loop proper. Returns once the child has exited and its output
/// streams have nothing more ready, or on interrupt/idle timeout.
///
/// Forwarding to the child's stdin is one of the awaited branches, so a
/// child that stops reading input never stalls draining its output.
async fn pump<F>(
    child: &mut Child,
    mut input: Option<BoxedReader>,
    table: &mut SinkTable,
    retained: &mut Retained,
    options: &MultiplexOptions,
    started: Instant,
    cancel: F,
) -> Result<ExitStatus>
where
    F: Future<Output = ()>,
{
    let mut child_in: Option<ChildStdin> = child.stdin.take();
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    if child_in.is_none() {
        input = None;
    }

    let chunk_size = options.chunk_size.max(1);
    let mut in_buf = vec![0u8; chunk_size];
    let mut out_buf = vec![0u8; chunk_size];
    let mut err_buf = vec![0u8; chunk_size];
    let mut forwarding = PendingInput::default();
    let mut stamper = options
        .timestamps
        .is_enabled()
        .then(|| LineStamper::new(options.timestamps, started));
    let mut stamped = Vec::new();
    let mut exited: Option<ExitStatus> = None;

    tokio::pin!(cancel);

    loop {
        if let Some(status) = exited {
            if stdout.is_none() && stderr.is_none() {
                return Ok(status);
            }
        }

        // After exit only output that is already on its way is drained.
        let wait = match exited {
            Some(_) => Some(DRAIN_WINDOW),
            None => options.idle_timeout,
        };

        let event = tokio::select! {
            _ = &mut cancel => Event::Cancelled,
            r = read_from(&mut stdout, &mut out_buf), if stdout.is_some() => {
                Event::Read(StreamId::Output, r)
            }
            r = read_from(&mut stderr, &mut err_buf), if stderr.is_some() => {
                Event::Read(StreamId::Error, r)
            }
            r = read_from(&mut input, &mut in_buf), if input.is_some() && forwarding.is_empty() => {
                Event::Input(r)
            }
            r = write_to(&mut child_in, forwarding.remaining()), if !forwarding.is_empty() => {
                Event::Forwarded(r)
            }
            r = child.wait(), if exited.is_none() => Event::Exited(r),
            _ = idle(wait) => Event::Idle,
        };

        match event {
            Event::Read(stream, Ok(0)) => {
                debug!(%stream, "end of stream");
                match stream {
                    StreamId::Output => stdout = None,
                    StreamId::Error => stderr = None,
                }
            }
            Event::Read(stream, Ok(n)) => {
                let raw = match stream {
                    StreamId::Output => &out_buf[..n],
                    StreamId::Error => &err_buf[..n],
                };
                let chunk = match stamper.as_mut() {
                    Some(stamper) => {
                        stamper.stamp(stream, raw, &mut stamped);
                        stamped.as_slice()
                    }
                    None => raw,
                };
                trace!(%stream, bytes = n, "chunk");
                table.write(stream, chunk).map_err(LogteeError::SinkWrite)?;
                if options.flushes_console() {
                    table
                        .flush(stream, options.flushes_sinks())
                        .map_err(LogteeError::SinkWrite)?;
                }
                retained.append(stream, chunk);
            }
            Event::Read(_, Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Event::Read(stream, Err(e)) => {
                warn!(%stream, error = %e, "read failed, closing stream");
                match stream {
                    StreamId::Output => stdout = None,
                    StreamId::Error => stderr = None,
                }
            }
            Event::Input(Ok(0)) => {
                debug!("input reached end of stream, closing child stdin");
                input = None;
                child_in = None;
            }
            Event::Input(Ok(n)) => forwarding.fill(&in_buf[..n]),
            Event::Input(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Event::Input(Err(e)) => {
                warn!(error = %e, "reading input failed, closing child stdin");
                input = None;
                child_in = None;
            }
            Event::Forwarded(Ok(0)) => {
                debug!("child stdin accepts no more data, no longer forwarding input");
                forwarding.clear();
                input = None;
                child_in = None;
            }
            Event::Forwarded(Ok(n)) => {
                forwarding.consume(n);
                if forwarding.is_empty() && !options.buffered {
                    if let Some(stdin) = child_in.as_mut() {
                        if let Err(e) = stdin.flush().await {
                            debug!(error = %e, "flushing child stdin failed");
                        }
                    }
                }
            }
            Event::Forwarded(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Event::Forwarded(Err(e)) => {
                debug!(error = %e, "child stdin closed, no longer forwarding input");
                forwarding.clear();
                input = None;
                child_in = None;
            }
            Event::Exited(Ok(status)) => {
                let status = ExitStatus::from(status);
                debug!(%status, "child exited");
                exited = Some(status);
                // Nothing can consume input any more.
                forwarding.clear();
                input = None;
                child_in = None;
            }
            Event::Exited(Err(e)) => return Err(e.into()),
            Event::Idle => {
                if let Some(status) = exited {
                    debug!("no output ready after exit, leaving remaining streams to other holders");
                    return Ok(status);
                }
                warn!(timeout = ?options.idle_timeout, "no activity within timeout, killing child");
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "kill failed");
                }
                return Ok(ExitStatus::TimedOut);
            }
            Event::Cancelled => {
                info!("interrupted");
                if options.kill_on_interrupt && exited.is_none() {
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "kill failed");
                    }
                }
                return Ok(ExitStatus::Interrupted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retained_disabled() {
        let mut retained = Retained::new(false);
        retained.append(StreamId::Output, b"dropped");
        assert_eq!(retained.into_texts(), (None, None));
    }

    #[test]
    fn test_retained_per_stream() {
        let mut retained = Retained::new(true);
        retained.append(StreamId::Output, b"out ");
        retained.append(StreamId::Error, b"err");
        retained.append(StreamId::Output, b"more");
        assert_eq!(
            retained.into_texts(),
            (Some("out more".to_string()), Some("err".to_string()))
        );
    }

    #[test]
    fn test_input_debug() {
        assert_eq!(format!("{:?}", Input::Null), "Null");
        assert_eq!(format!("{:?}", Input::default()), "Inherit");
    }

    #[test]
    fn test_options_accessor() {
        let mux = Multiplexer::new(MultiplexOptions::default().with_retain(true));
        assert!(mux.options().retain);
    }
}
