//! Terminal output normalization.
//!
//! This module turns raw terminal traffic into plain text:
//! - ANSI/VT escape, control and OSC sequences are discarded
//! - carriage-return redraws and backspaces resolve to the final line
//! - tabs are expanded when a line is written
//!
//! # Example
//!
//! ```
//! use logtee::output::normalize_bytes;
//!
//! let raw = b"\x1b[31mRed text\x1b[0m\n10%\r100%\n";
//! assert_eq!(normalize_bytes(raw), "Red text\n100%\n");
//! ```

mod line;
mod normalizer;
mod utf8;

pub use line::{expand_tabs, LineBuffer, DEFAULT_TAB_WIDTH};
pub use normalizer::{
    clean_log_file, normalize, normalize_bytes, normalize_file, NormalizeOptions, Normalizer,
    ParseState, DEFAULT_CHUNK_SIZE,
};
pub use utf8::Utf8Decoder;
