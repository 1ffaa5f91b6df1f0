//! Multiplexer integration tests.
//!
//! These run real child processes through `sh`, so they are unix-only.

#![cfg(unix)]

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use logtee::execution::{
    Command, Console, ExitStatus, FlushScope, Input, MultiplexOptions, Multiplexer, Sink, Sinks,
    Timestamps, INTERRUPTED_EXIT_CODE,
};
use logtee::LogteeError;

/// A clonable in-memory writer standing in for a console stream.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Counts flushes it receives.
#[derive(Clone, Default)]
struct FlushCounter(Arc<AtomicUsize>);

impl FlushCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Write for FlushCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A console whose reader has gone away, like a closed pipe.
struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader closed"))
    }
}

fn sh(script: &str) -> Command {
    Command::new("sh").arg("-c").arg(script)
}

fn multiplexer(options: MultiplexOptions) -> (Multiplexer, Capture, Capture) {
    let out = Capture::default();
    let err = Capture::default();
    let mux = Multiplexer::new(options)
        .with_console(Console::new(out.clone(), err.clone()))
        .with_input(Input::Null);
    (mux, out, err)
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_fan_out_to_two_sinks_and_console() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.log");
    let second = dir.path().join("second.log");
    let (mux, out, err) = multiplexer(MultiplexOptions::default());

    let outcome = mux
        .run_until(
            &Command::new("echo").arg("hello world"),
            Sinks::tee([&first, &second]),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, ExitStatus::Exited(0));
    assert!(outcome.is_success());

    let first = std::fs::read_to_string(&first).unwrap();
    let second = std::fs::read_to_string(&second).unwrap();
    assert_eq!(first, "hello world\n");
    assert_eq!(second, first);
    assert_eq!(out.text(), first);
    assert_eq!(err.text(), "");
}

#[tokio::test]
async fn test_both_streams_reach_shared_sink() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.log");
    let second = dir.path().join("b.log");
    let (mux, out, err) = multiplexer(MultiplexOptions::default());

    let outcome = mux
        .run_until(
            &sh("echo to-out; echo to-err >&2"),
            Sinks::tee([&first, &second]),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(out.text(), "to-out\n");
    assert_eq!(err.text(), "to-err\n");

    // Interleaving between the streams is not fixed, but both sinks saw
    // the same chunks in the same order.
    let first = std::fs::read_to_string(&first).unwrap();
    assert_eq!(std::fs::read_to_string(&second).unwrap(), first);
    assert!(first.contains("to-out\n"));
    assert!(first.contains("to-err\n"));
}

#[tokio::test]
async fn test_stream_bound_sinks_stay_separate() {
    let dir = tempfile::tempdir().unwrap();
    let out_log = dir.path().join("stdout.log");
    let err_log = dir.path().join("stderr.log");
    let (mux, _, _) = multiplexer(MultiplexOptions::default());

    let sinks = Sinks::new()
        .with_output(Sink::path(&out_log))
        .with_error(Sink::path(&err_log));
    mux.run_until(&sh("echo o; echo e >&2"), sinks, std::future::pending())
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&out_log).unwrap(), "o\n");
    assert_eq!(std::fs::read_to_string(&err_log).unwrap(), "e\n");
}

#[tokio::test]
async fn test_append_keeps_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("run.log");
    std::fs::write(&log, "+ header\n\n").unwrap();
    let (mux, _, _) = multiplexer(MultiplexOptions::default().with_append(true));

    mux.run_until(
        &Command::new("echo").arg("body"),
        Sinks::tee([&log]),
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read_to_string(&log).unwrap(), "+ header\n\nbody\n");
}

// ============================================================================
// Exit status and retention
// ============================================================================

#[tokio::test]
async fn test_non_zero_exit_is_data() {
    let (mux, _, _) = multiplexer(
        MultiplexOptions::default()
            .with_expected_exit(Some(0))
            .with_retain(true),
    );

    let outcome = mux
        .run_until(
            &sh("echo out; echo err >&2; exit 2"),
            Sinks::new(),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, ExitStatus::Exited(2));
    assert_eq!(outcome.code(), 2);
    assert!(outcome.failed());
    assert_eq!(outcome.output.as_deref(), Some("out\n"));
    assert_eq!(outcome.error.as_deref(), Some("err\n"));
}

#[tokio::test]
async fn test_expected_non_zero_exit_is_success() {
    let (mux, _, _) = multiplexer(MultiplexOptions::default().with_expected_exit(Some(3)));

    let outcome = mux
        .run_until(&sh("exit 3"), Sinks::new(), std::future::pending())
        .await
        .unwrap();

    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_no_retention_by_default() {
    let (mux, out, _) = multiplexer(MultiplexOptions::default());

    let outcome = mux
        .run_until(
            &Command::new("echo").arg("x"),
            Sinks::new(),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert!(outcome.output.is_none());
    assert!(outcome.error.is_none());
    assert_eq!(out.text(), "x\n");
}

#[tokio::test]
async fn test_background_grandchild_does_not_hold_run() {
    let (mux, out, _) = multiplexer(MultiplexOptions::default());

    let started = std::time::Instant::now();
    let outcome = mux
        .run_until(&sh("echo hi; sleep 6 &"), Sinks::new(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(outcome.status, ExitStatus::Exited(0));
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    assert_eq!(out.text(), "hi\n");
}

#[tokio::test]
async fn test_output_written_just_before_exit_is_kept() {
    let (mux, _, _) = multiplexer(MultiplexOptions::default().with_retain(true));

    let outcome = mux
        .run_until(
            &sh("i=0; while [ $i -lt 500 ]; do echo row $i; i=$((i+1)); done; exit 4"),
            Sinks::new(),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, ExitStatus::Exited(4));
    assert_eq!(outcome.output_text().lines().count(), 500);
    assert!(outcome.output_text().ends_with("row 499\n"));
}

#[tokio::test]
async fn test_closed_console_still_logs() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("run.log");

    let outcome = Multiplexer::new(MultiplexOptions::default())
        .with_console(Console::new(ClosedPipe, Capture::default()))
        .with_input(Input::Null)
        .run_until(
            &sh("echo one; echo two; echo three"),
            Sinks::tee([&log]),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "one\ntwo\nthree\n");
}

#[tokio::test]
async fn test_timestamps_prefix_each_line() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("stamped.log");
    let options = MultiplexOptions::default()
        .with_timestamps(Timestamps::none().with_elapsed(true))
        .with_retain(true);
    let (mux, out, _) = multiplexer(options);

    let outcome = mux
        .run_until(&sh("echo alpha; echo beta"), Sinks::tee([&log]), std::future::pending())
        .await
        .unwrap();

    let logged = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = logged.lines().collect();
    assert_eq!(lines.len(), 2);
    for (line, word) in lines.iter().zip(["alpha", "beta"]) {
        let (stamp, text) = line.trim_start().split_once(' ').unwrap();
        assert!(stamp.parse::<f64>().is_ok(), "{:?}", line);
        assert_eq!(text, word);
    }
    assert_eq!(out.text(), logged);
    assert_eq!(outcome.output_text(), logged);
}

#[tokio::test]
async fn test_large_output_fully_captured() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("big.log");
    let (mux, out, _) = multiplexer(MultiplexOptions::default().with_chunk_size(512));

    let outcome = mux
        .run_until(
            &sh("i=0; while [ $i -lt 2000 ]; do echo line $i; i=$((i+1)); done"),
            Sinks::tee([&log]),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert!(outcome.is_success());
    let logged = std::fs::read_to_string(&log).unwrap();
    assert_eq!(logged.lines().count(), 2000);
    assert!(logged.ends_with("line 1999\n"));
    assert_eq!(out.text(), logged);
}

// ============================================================================
// Input forwarding
// ============================================================================

#[tokio::test]
async fn test_input_forwarded_to_child() {
    let out = Capture::default();
    let reader = tokio_test::io::Builder::new()
        .read(b"hello\n")
        .read(b"world\n")
        .build();

    let outcome = Multiplexer::new(MultiplexOptions::default().with_retain(true))
        .with_console(Console::new(out.clone(), Capture::default()))
        .with_input(Input::Reader(Box::new(reader)))
        .run_until(&Command::new("cat"), Sinks::new(), std::future::pending())
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.output_text(), "hello\nworld\n");
    assert_eq!(out.text(), "hello\nworld\n");
}

#[tokio::test]
async fn test_large_input_round_trips_through_cat() {
    const SIZE: usize = 8 * 1024 * 1024;
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cat.log");
    let out = Capture::default();
    let input = std::io::Cursor::new(vec![b'x'; SIZE]);

    // cat blocks on a full stdout pipe unless output is drained while input
    // is still being forwarded.
    let cat = Command::new("cat");
    let run = Multiplexer::new(MultiplexOptions::default())
        .with_console(Console::new(out.clone(), Capture::default()))
        .with_input(Input::Reader(Box::new(input)))
        .run_until(&cat, Sinks::tee([&log]), std::future::pending());
    let outcome = tokio::time::timeout(Duration::from_secs(30), run)
        .await
        .expect("forwarding large input must not stall")
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(std::fs::metadata(&log).unwrap().len(), SIZE as u64);
    assert_eq!(out.0.lock().unwrap().len(), SIZE);
}

#[tokio::test]
async fn test_null_input_gives_child_eof() {
    let (mux, _, _) = multiplexer(MultiplexOptions::default().with_retain(true));

    let outcome = mux
        .run_until(&Command::new("cat"), Sinks::new(), std::future::pending())
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.output_text(), "");
}

// ============================================================================
// Flushing
// ============================================================================

async fn flushes_seen(options: MultiplexOptions) -> usize {
    let counter = FlushCounter::default();
    let (mux, _, _) = multiplexer(options);
    let sinks = Sinks::new().with_output(Sink::writer("counter", counter.clone()));

    mux.run_until(
        &Command::new("echo").arg("hi"),
        sinks,
        std::future::pending(),
    )
    .await
    .unwrap();
    counter.count()
}

#[tokio::test]
async fn test_buffered_flushes_sink_only_on_close() {
    assert_eq!(flushes_seen(MultiplexOptions::default()).await, 1);
}

#[tokio::test]
async fn test_unbuffered_console_only_leaves_sinks_alone() {
    let options = MultiplexOptions::default()
        .with_buffered(false)
        .with_flush_scope(FlushScope::ConsoleOnly);
    assert_eq!(flushes_seen(options).await, 1);
}

#[tokio::test]
async fn test_unbuffered_flushes_sinks_per_chunk() {
    let options = MultiplexOptions::default()
        .with_buffered(false)
        .with_flush_scope(FlushScope::ConsoleAndSinks);
    // At least one per-chunk flush plus the one on close.
    assert!(flushes_seen(options).await >= 2);
}

// ============================================================================
// Failures, cancellation and timeouts
// ============================================================================

#[tokio::test]
async fn test_missing_program_is_startup_failure() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("never.log");
    let (mux, _, _) = multiplexer(MultiplexOptions::default());

    let err = mux
        .run_until(
            &Command::new("/nonexistent/logtee-test-tool"),
            Sinks::tee([&log]),
            std::future::pending(),
        )
        .await
        .unwrap_err();

    assert!(err.is_startup());
    assert!(!log.exists(), "no sink is created when the child cannot start");
}

#[tokio::test]
async fn test_unopenable_sink_fails_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let bad_sink = dir.path().join("no-such-dir").join("run.log");
    let (mux, _, _) = multiplexer(MultiplexOptions::default());

    let err = mux
        .run_until(
            &Command::new("touch").arg(marker.to_string_lossy()),
            Sinks::tee([&bad_sink]),
            std::future::pending(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, LogteeError::SinkOpen { .. }));
    assert!(!marker.exists(), "child must not run when a sink cannot be opened");
}

#[tokio::test]
async fn test_interrupt_flushes_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("interrupted.log");
    let (mux, out, _) = multiplexer(MultiplexOptions::default().with_kill_on_interrupt(true));

    let started = std::time::Instant::now();
    let outcome = mux
        .run_until(
            &sh("echo started; sleep 5; echo never"),
            Sinks::tee([&log]),
            tokio::time::sleep(Duration::from_millis(500)),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, ExitStatus::Interrupted);
    assert_eq!(outcome.code(), INTERRUPTED_EXIT_CODE);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "started\n");
    assert_eq!(out.text(), "started\n");
}

#[tokio::test]
async fn test_interrupt_leaves_child_running_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("interrupted.log");
    let marker = dir.path().join("finished");
    let (mux, _, _) = multiplexer(MultiplexOptions::default());

    let script = format!("echo started; sleep 1; touch '{}'", marker.display());
    let outcome = mux
        .run_until(
            &sh(&script),
            Sinks::tee([&log]),
            tokio::time::sleep(Duration::from_millis(300)),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, ExitStatus::Interrupted);
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "started\n");
    assert!(!marker.exists());

    // The child was not killed, so it finishes on its own.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !marker.exists() && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(marker.exists(), "child should keep running after an interrupt");
}

#[tokio::test]
async fn test_idle_timeout_kills_silent_child() {
    let options = MultiplexOptions::default().with_idle_timeout(Some(Duration::from_millis(200)));
    let (mux, _, _) = multiplexer(options);

    let started = std::time::Instant::now();
    let outcome = mux
        .run_until(&Command::new("sleep").arg("5"), Sinks::new(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(outcome.status, ExitStatus::TimedOut);
    assert!(outcome.failed());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_idle_timeout_spares_chatty_child() {
    let options = MultiplexOptions::default()
        .with_idle_timeout(Some(Duration::from_millis(1500)))
        .with_retain(true);
    let (mux, _, _) = multiplexer(options);

    // Runs longer than the timeout overall, but never goes quiet that long.
    let outcome = mux
        .run_until(
            &sh("for i in 1 2 3 4; do echo $i; sleep 0.5; done"),
            Sinks::new(),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, ExitStatus::Exited(0));
    assert_eq!(outcome.output_text(), "1\n2\n3\n4\n");
}
