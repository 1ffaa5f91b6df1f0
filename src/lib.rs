//! # logtee
//!
//! Run a command while teeing its output to the terminal and to log files,
//! then turn the captured terminal traffic into plain text.
//!
//! The crate has two halves:
//!
//! - [`execution`]: a readiness-driven loop that starts a child process,
//!   forwards input to it and fans its stdout/stderr out to the console and
//!   any number of sinks, optionally retaining a copy in memory.
//! - [`output`]: a streaming normalizer that drops escape sequences and
//!   resolves carriage-return redraws, backspaces and tabs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use logtee::execution::{Command, Multiplexer, MultiplexOptions, Sinks};
//! use logtee::output::{clean_log_file, NormalizeOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> logtee::Result<()> {
//!     logtee::logging::try_init().ok();
//!
//!     let cmd = Command::new("make").arg("test");
//!     let outcome = Multiplexer::new(MultiplexOptions::default())
//!         .run(&cmd, Sinks::tee(["test.log"]))
//!         .await?;
//!
//!     clean_log_file(
//!         "test.log".as_ref(),
//!         "test.log.raw".as_ref(),
//!         &NormalizeOptions::default(),
//!     )?;
//!     println!("make test: {}", outcome.status);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod output;

// Re-export commonly used types
pub use error::{LogteeError, Result};
pub use execution::{
    Command, ExitStatus, MultiplexOptions, MultiplexOutcome, Multiplexer, Sinks, Timestamps,
};
pub use output::{normalize, normalize_bytes, NormalizeOptions, Normalizer};
