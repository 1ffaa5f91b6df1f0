//! The single "current line" a terminal cursor moves across.

use std::io::{self, Write};

/// Default distance between tab stops.
pub const DEFAULT_TAB_WIDTH: usize = 8;

/// Index-addressable line with a cursor.
///
/// `cells` may hold stale characters past `len`; only `cells[..len]` is
/// visible. Overwriting in place is the common case, so the buffer is never
/// shrunk except by [`LineBuffer::clear`].
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    cells: Vec<char>,
    len: usize,
    col: usize,
    truncate_on_overwrite: bool,
}

impl LineBuffer {
    /// Create an empty line with the cursor at column 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `ch` at the cursor and advance.
    pub fn put(&mut self, ch: char) {
        if self.col < self.cells.len() {
            self.cells[self.col] = ch;
        } else {
            self.cells.resize(self.col, ' ');
            self.cells.push(ch);
        }
        self.col += 1;

        if self.truncate_on_overwrite {
            self.len = self.col;
        } else {
            self.len = self.len.max(self.col);
        }
    }

    /// Move the cursor one column left, erasing everything from there on.
    pub fn backspace(&mut self) {
        if self.col > 0 {
            self.col -= 1;
            self.len = self.len.min(self.col);
        }
    }

    /// Return to column 0; the next write truncates the line.
    pub fn carriage_return(&mut self) {
        self.col = 0;
        self.truncate_on_overwrite = true;
    }

    /// Forget the line and reset the cursor model.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.len = 0;
        self.col = 0;
        self.truncate_on_overwrite = false;
    }

    /// Number of visible characters.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Cursor column.
    pub fn column(&self) -> usize {
        self.col
    }

    pub fn truncates_on_overwrite(&self) -> bool {
        self.truncate_on_overwrite
    }

    /// Visible text with tabs expanded to `tab_width` stops.
    pub fn expanded(&self, tab_width: usize) -> String {
        expand_tabs(&self.cells[..self.len], tab_width)
    }

    /// Write the visible text, tab-expanded, to `out`.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W, tab_width: usize) -> io::Result<()> {
        if self.len > 0 {
            out.write_all(self.expanded(tab_width).as_bytes())?;
        }
        Ok(())
    }
}

/// Replace each tab with spaces up to the next multiple of `tab_width`.
///
/// A width of 0 removes tabs.
pub fn expand_tabs(cells: &[char], tab_width: usize) -> String {
    let mut text = String::with_capacity(cells.len());
    let mut column = 0usize;

    for &ch in cells {
        if ch == '\t' {
            if tab_width > 0 {
                let pad = tab_width - column % tab_width;
                text.extend(std::iter::repeat(' ').take(pad));
                column += pad;
            }
        } else {
            text.push(ch);
            column += 1;
        }
    }

    text
}
