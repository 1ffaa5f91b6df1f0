//! Raw terminal output to plain text.
//!
//! A single forward pass over decoded characters drives a four-state parser
//! and a one-line cursor model. Escape, control and operating-system
//! sequences are dropped; carriage-return redraws and backspaces are
//! resolved to what the line finally showed; tabs are expanded when a line
//! is written out.
//!
//! All parser state lives in [`Normalizer`], so a sequence (or a multi-byte
//! character) split between two reads resumes exactly where it stopped.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::line::{LineBuffer, DEFAULT_TAB_WIDTH};
use super::utf8::Utf8Decoder;
use crate::Result;

const ESC: char = '\x1B';
const BEL: char = '\x07';
const BACKSPACE: char = '\x08';

/// Longest sequence kept for diagnostics; longer ones are still consumed.
const MAX_SEQUENCE_LEN: usize = 256;

/// Default read size.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Options for [`normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Bytes read from the source per chunk.
    pub chunk_size: usize,
    /// Flush a still-growing line once it reaches this many characters
    /// (checked after each chunk). 0 disables.
    pub partial_flush_threshold: usize,
    /// Distance between tab stops.
    pub tab_width: usize,
}

impl NormalizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_partial_flush_threshold(mut self, threshold: usize) -> Self {
        self.partial_flush_threshold = threshold;
        self
    }

    pub fn with_tab_width(mut self, width: usize) -> Self {
        self.tab_width = width;
        self
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            partial_flush_threshold: 0,
            tab_width: DEFAULT_TAB_WIDTH,
        }
    }
}

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    #[default]
    Normal,
    /// Saw ESC.
    Escape,
    /// Inside `ESC [`, waiting for a final byte in `@`..=`~`.
    ControlSequence,
    /// Inside `ESC ]`, waiting for BEL or `ESC \`.
    OperatingSystemCommand,
}

/// Streaming normalizer state.
#[derive(Debug, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
    state: ParseState,
    sequence: String,
    last: Option<char>,
    line: LineBuffer,
    decoder: Utf8Decoder,
    scratch: String,
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// The line currently being assembled.
    pub fn line(&self) -> &LineBuffer {
        &self.line
    }

    /// Consume one chunk of raw bytes, writing completed lines to `out`.
    pub fn feed<W: Write + ?Sized>(&mut self, bytes: &[u8], out: &mut W) -> io::Result<()> {
        let mut text = std::mem::take(&mut self.scratch);
        text.clear();
        self.decoder.decode(bytes, &mut text);

        let result = text.chars().try_for_each(|ch| self.step(ch, out));
        self.scratch = text;
        result?;

        let threshold = self.options.partial_flush_threshold;
        if threshold > 0 && self.line.len() >= threshold {
            trace!(len = self.line.len(), "partial flush of long line");
            self.flush_line(out)?;
        }
        Ok(())
    }

    /// End of input: write any unterminated line without a line terminator.
    ///
    /// An incomplete escape sequence is dropped. The normalizer is reset and
    /// may be reused for another stream.
    pub fn finish<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        let mut text = std::mem::take(&mut self.scratch);
        text.clear();
        self.decoder.finish(&mut text);
        let result = text.chars().try_for_each(|ch| self.step(ch, out));
        self.scratch = text;
        result?;

        if self.state != ParseState::Normal {
            debug!(state = ?self.state, sequence = ?self.sequence, "dropping unterminated sequence");
        }
        self.line.write_to(out, self.options.tab_width)?;

        self.state = ParseState::Normal;
        self.sequence.clear();
        self.last = None;
        self.line.clear();
        Ok(())
    }

    fn step<W: Write + ?Sized>(&mut self, ch: char, out: &mut W) -> io::Result<()> {
        match self.state {
            ParseState::Normal => match ch {
                ESC => {
                    self.begin_sequence(ch);
                    self.state = ParseState::Escape;
                }
                BACKSPACE => self.line.backspace(),
                '\r' => self.line.carriage_return(),
                '\n' => self.flush_line(out)?,
                _ => self.line.put(ch),
            },
            ParseState::Escape => {
                self.accumulate(ch);
                self.state = match ch {
                    '[' => ParseState::ControlSequence,
                    ']' => ParseState::OperatingSystemCommand,
                    _ => self.end_sequence(),
                };
            }
            ParseState::ControlSequence => {
                self.accumulate(ch);
                if ('@'..='~').contains(&ch) {
                    self.state = self.end_sequence();
                }
            }
            ParseState::OperatingSystemCommand => {
                let string_terminator = ch == '\\' && self.last == Some(ESC);
                self.accumulate(ch);
                if ch == BEL || string_terminator {
                    self.state = self.end_sequence();
                }
            }
        }
        Ok(())
    }

    fn begin_sequence(&mut self, ch: char) {
        self.sequence.clear();
        self.sequence.push(ch);
        self.last = Some(ch);
    }

    fn accumulate(&mut self, ch: char) {
        if self.sequence.len() < MAX_SEQUENCE_LEN {
            self.sequence.push(ch);
        }
        self.last = Some(ch);
    }

    fn end_sequence(&mut self) -> ParseState {
        trace!(sequence = ?self.sequence, "discarded sequence");
        self.sequence.clear();
        self.last = None;
        ParseState::Normal
    }

    fn flush_line<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        self.line.write_to(out, self.options.tab_width)?;
        out.write_all(b"\n")?;
        self.line.clear();
        Ok(())
    }
}

/// Normalize `source` into `sink`, reading until end-of-stream.
///
/// # Errors
///
/// Only I/O errors from `source` or `sink`; any byte sequence is accepted.
pub fn normalize<R, W>(mut source: R, sink: W, options: &NormalizeOptions) -> Result<()>
where
    R: Read,
    W: Write,
{
    let mut sink = BufWriter::new(sink);
    let mut normalizer = Normalizer::new(*options);
    let mut buf = vec![0u8; options.chunk_size.max(1)];

    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        normalizer.feed(&buf[..n], &mut sink)?;
    }

    normalizer.finish(&mut sink)?;
    sink.flush()?;
    Ok(())
}

/// Normalize an in-memory buffer.
pub fn normalize_bytes(input: &[u8]) -> String {
    let mut normalizer = Normalizer::new(NormalizeOptions::default());
    let mut out = Vec::with_capacity(input.len());
    let fed = normalizer
        .feed(input, &mut out)
        .and_then(|()| normalizer.finish(&mut out));
    debug_assert!(fed.is_ok(), "writing into a Vec cannot fail: {:?}", fed);
    String::from_utf8_lossy(&out).into_owned()
}

/// Normalize the file at `raw` into a new file at `text`.
pub fn normalize_file(raw: &Path, text: &Path, options: &NormalizeOptions) -> Result<()> {
    let source = File::open(raw)?;
    let sink = File::create(text)?;
    normalize(source, sink, options)
}

/// Replace `log` with its normalized text, preserving the raw bytes at `raw`.
///
/// The clean text is produced beside `log` first; `log` is only renamed once
/// normalization succeeded, so a failure leaves it untouched.
pub fn clean_log_file(log: &Path, raw: &Path, options: &NormalizeOptions) -> Result<()> {
    let mut staging = log.as_os_str().to_owned();
    staging.push(".txt");
    let staging = std::path::PathBuf::from(staging);

    if let Err(e) = normalize_file(log, &staging, options) {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }

    if raw != log {
        std::fs::rename(log, raw)?;
    }
    std::fs::rename(&staging, log)?;
    debug!(log = %log.display(), raw = %raw.display(), "log normalized");
    Ok(())
}
