//! Command execution with output fan-out.
//!
//! This module runs a child process and tees what it prints:
//! - every chunk of stdout/stderr goes to the matching console stream
//! - and to each sink bound to that stream, in order
//! - optionally retained in memory for the caller
//! - optionally prefixed with elapsed or wall-clock time per line
//!
//! # Example
//!
//! ```no_run
//! use logtee::execution::{Command, Multiplexer, MultiplexOptions, Sinks};
//!
//! # async fn demo() -> logtee::Result<()> {
//! let cmd = Command::new("cargo").arg("build");
//! let options = MultiplexOptions::default().with_retain(true);
//!
//! let outcome = Multiplexer::new(options)
//!     .run(&cmd, Sinks::tee(["build.log"]))
//!     .await?;
//! println!("{} -> {}", cmd.command_line(), outcome.status);
//! # Ok(())
//! # }
//! ```

mod command;
mod executor;
mod options;
mod result;
mod sink;
mod stamp;

pub use command::Command;
pub use executor::{BoxedReader, Input, Multiplexer};
pub use options::{FlushScope, MultiplexOptions, DEFAULT_CHUNK_SIZE};
pub use result::{
    ExitStatus, MultiplexOutcome, StreamId, INTERRUPTED_EXIT_CODE, TIMED_OUT_EXIT_CODE,
};
pub use sink::{BoxedWriter, Console, Sink, SinkTable, Sinks};
pub use stamp::{LineStamper, Timestamps};
