//! The ring-buffered terminal grid.
//!
//! The grid stores `cols x (rows + scrollback_rows)` cells in one contiguous
//! allocation used as a ring over the row axis. `row_start` names the backing
//! row holding logical row 0 (the top of the view); logical rows in
//! `[-scrollback_len, rows)` are reachable, negative rows being scrollback.
//! Scrolling is a rotation of `row_start`, so pushing a row into history is
//! O(cols) for the clear of the newly exposed row and nothing else.
//!
//! Cells written while the cursor is anchored carry a line-continuation flag;
//! `reflow_into` replays content into a grid of a different width using those
//! flags to decide where the hard line breaks are.

use log::trace;
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

use crate::cell::{Cell, CellFlags};
use crate::cursor::Cursor;
use crate::modes::{ModeSet, PrivateMode};

/// Grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub cols: usize,
    pub rows: usize,
    pub scrollback_rows: usize,
}

impl Size {
    pub fn new(cols: usize, rows: usize, scrollback_rows: usize) -> Self {
        Size {
            cols: cols.max(1),
            rows: rows.max(1),
            scrollback_rows,
        }
    }
}

/// Erase-in-line variants (CSI K).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseLine {
    Right,
    Left,
    All,
}

/// Erase-in-display variants (CSI J).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseDisplay {
    Below,
    Above,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    size: Size,
    cells: Vec<Cell>,
    /// Backing row index of logical row 0.
    row_start: usize,
    /// Number of valid history rows above the view.
    scrollback_len: usize,
    pub cursor: Cursor,
    /// Scroll margin top, inclusive.
    margin_top: usize,
    /// Scroll margin bottom, exclusive.
    margin_bot: usize,
    modes: ModeSet,
}

impl Grid {
    pub fn new(size: Size) -> Self {
        let size = Size::new(size.cols, size.rows, size.scrollback_rows);
        let total = size.rows + size.scrollback_rows;
        Grid {
            cells: vec![Cell::default(); size.cols * total],
            row_start: 0,
            scrollback_len: 0,
            cursor: Cursor::default(),
            margin_top: 0,
            margin_bot: size.rows,
            modes: ModeSet::default(),
            size,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn cols(&self) -> usize {
        self.size.cols
    }

    pub fn rows(&self) -> usize {
        self.size.rows
    }

    pub fn scrollback_len(&self) -> usize {
        self.scrollback_len
    }

    /// Scroll margins as (top inclusive, bottom exclusive).
    pub fn margins(&self) -> (usize, usize) {
        (self.margin_top, self.margin_bot)
    }

    fn total_rows(&self) -> usize {
        self.size.rows + self.size.scrollback_rows
    }

    /// Backing row index for a logical row in `[-scrollback_len, rows)`.
    fn backing_row(&self, row: isize) -> usize {
        let total = self.total_rows() as isize;
        debug_assert!(row >= -(self.scrollback_len as isize));
        debug_assert!(row < self.size.rows as isize);
        (self.row_start as isize + row).rem_euclid(total) as usize
    }

    /// The cells of a logical row. Negative rows address scrollback.
    pub fn row(&self, row: isize) -> &[Cell] {
        let b = self.backing_row(row);
        &self.cells[b * self.size.cols..(b + 1) * self.size.cols]
    }

    fn row_mut(&mut self, row: isize) -> &mut [Cell] {
        let b = self.backing_row(row);
        let cols = self.size.cols;
        &mut self.cells[b * cols..(b + 1) * cols]
    }

    fn cell_mut(&mut self, row: usize, col: usize) -> &mut Cell {
        &mut self.row_mut(row as isize)[col]
    }

    fn clear_row(&mut self, row: isize) {
        self.row_mut(row).fill(Cell::default());
    }

    fn copy_row(&mut self, src: isize, dst: isize) {
        let cols = self.size.cols;
        let s = self.backing_row(src) * cols;
        let d = self.backing_row(dst) * cols;
        self.cells.copy_within(s..s + cols, d);
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    /// Write one codepoint at the cursor with the current brush.
    ///
    /// Wide glyphs occupy two cells, the second a spacer inheriting the
    /// first's style. Writes past the last column wrap, marking the filled
    /// tail and the wrapped cell with the continuation flag when the cursor
    /// was anchored, so reflow can undo the wrap at a different width.
    pub fn write(&mut self, ch: char) {
        // Combining marks report width 0; lay them out as width 1.
        let width = UnicodeWidthChar::width(ch).unwrap_or(1).max(1);
        let w = width.min(self.size.cols);

        if self.cursor.col + w > self.size.cols {
            let continuation = self.cursor.anchored;
            let row = self.cursor.row;
            for col in self.cursor.col.min(self.size.cols)..self.size.cols {
                *self.cell_mut(row, col) = Cell::filler(continuation);
            }
            self.cursor.col = 0;
            self.advance_row_scrolling();
        }

        let (row, col) = (self.cursor.row, self.cursor.col);
        let brush = self.cursor.brush;
        let continuation = self.cursor.anchored;

        let cell = self.cell_mut(row, col);
        cell.ch = ch;
        cell.style = brush;
        cell.flags = CellFlags::empty();
        cell.flags.set(CellFlags::LINE_CONTINUATION, continuation);

        for i in 1..w {
            *self.cell_mut(row, col + i) = Cell {
                ch: '\0',
                flags: CellFlags::new(CellFlags::LINE_CONTINUATION | CellFlags::INHERIT_STYLE),
                style: brush,
            };
        }

        self.cursor.col += w;
        self.cursor.anchored = true;
    }

    /// Move the cursor down one row, scrolling when it sits on the bottom
    /// margin. Rows scrolled off a region whose top coincides with the view
    /// top are retained in scrollback; a lowered top margin rotates the
    /// region only and the scrolled-off row is discarded.
    fn advance_row_scrolling(&mut self) {
        if self.cursor.row + 1 == self.margin_bot {
            if self.margin_top == 0 {
                self.scroll_up_into_scrollback();
            } else {
                self.scroll_region_up(self.margin_top, 1);
            }
        } else if self.cursor.row + 1 < self.size.rows {
            self.cursor.row += 1;
        }
    }

    /// Scroll `[0, margin_bot)` up by one, pushing the old top row into
    /// history. The ring rotation shifts every view row; rows below the
    /// bottom margin are shifted back into place afterwards. Scrollback
    /// length saturates at its capacity.
    fn scroll_up_into_scrollback(&mut self) {
        let rows = self.size.rows;
        let bot = self.margin_bot;
        let total = self.total_rows();
        self.row_start = (self.row_start + 1) % total;
        self.scrollback_len = (self.scrollback_len + 1).min(self.size.scrollback_rows);
        self.clear_row(rows as isize - 1);
        for r in (bot - 1..rows - 1).rev() {
            self.copy_row(r as isize, r as isize + 1);
        }
        self.clear_row(bot as isize - 1);
    }

    /// Shift rows in `[top, margin_bot)` up by `n`, clearing the bottom `n`.
    fn scroll_region_up(&mut self, top: usize, n: usize) {
        let bot = self.margin_bot;
        if top >= bot {
            return;
        }
        let n = n.min(bot - top);
        for r in top..bot - n {
            self.copy_row((r + n) as isize, r as isize);
        }
        for r in bot - n..bot {
            self.clear_row(r as isize);
        }
    }

    /// Shift rows in `[top, margin_bot)` down by `n`, clearing the top `n`.
    fn scroll_region_down(&mut self, top: usize, n: usize) {
        let bot = self.margin_bot;
        if top >= bot {
            return;
        }
        let n = n.min(bot - top);
        for r in (top + n..bot).rev() {
            self.copy_row((r - n) as isize, r as isize);
        }
        for r in top..top + n {
            self.clear_row(r as isize);
        }
    }

    // ------------------------------------------------------------------
    // Cursor motion
    // ------------------------------------------------------------------

    /// Absolute cursor motion, clamped to the view. Never scrolls.
    pub fn move_to(&mut self, row: usize, col: usize) {
        self.cursor.row = row.min(self.size.rows - 1);
        self.cursor.col = col.min(self.size.cols - 1);
        self.cursor.anchored = false;
    }

    /// Relative vertical motion, clamped to the view. Never scrolls.
    pub fn move_rows(&mut self, delta: isize) {
        let row = self.cursor.row as isize + delta;
        self.cursor.row = row.clamp(0, self.size.rows as isize - 1) as usize;
        self.cursor.anchored = false;
    }

    /// Relative horizontal motion, clamped to the row.
    pub fn move_cols(&mut self, delta: isize) {
        let col = self.cursor.col as isize + delta;
        self.cursor.col = col.clamp(0, self.size.cols as isize - 1) as usize;
        self.cursor.anchored = false;
    }

    pub fn carriage_return(&mut self) {
        self.cursor.col = 0;
        self.cursor.anchored = false;
    }

    /// Line feed: down one row, scrolling at the bottom margin.
    pub fn linefeed(&mut self) {
        self.cursor.anchored = false;
        self.advance_row_scrolling();
    }

    /// Reverse line feed: up one row, scrolling the margin region down when
    /// the cursor sits on the top margin.
    pub fn reverse_linefeed(&mut self) {
        self.cursor.anchored = false;
        if self.cursor.row == self.margin_top {
            self.scroll_region_down(self.margin_top, 1);
        } else if self.cursor.row > 0 {
            self.cursor.row -= 1;
        }
    }

    /// Pad spaces with the current brush up to the next multiple-of-8 stop.
    /// Never wraps onto the next row.
    pub fn tab(&mut self) {
        while self.cursor.col < self.size.cols {
            self.write(' ');
            if self.cursor.col % 8 == 0 {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Editing primitives
    // ------------------------------------------------------------------

    pub fn erase_in_line(&mut self, what: EraseLine) {
        let cols = self.size.cols;
        let col = self.cursor.col.min(cols - 1);
        let range = match what {
            EraseLine::Right => col..cols,
            EraseLine::Left => 0..col + 1,
            EraseLine::All => 0..cols,
        };
        self.row_mut(self.cursor.row as isize)[range].fill(Cell::default());
    }

    /// Erased rows are dropped, not fed into scrollback.
    pub fn erase_in_display(&mut self, what: EraseDisplay) {
        let range = match what {
            EraseDisplay::Below => self.cursor.row..self.size.rows,
            EraseDisplay::Above => 0..self.cursor.row + 1,
            EraseDisplay::All => 0..self.size.rows,
        };
        for r in range {
            self.clear_row(r as isize);
        }
    }

    /// Insert `n` blank lines, shifting rows down within the scroll margins.
    /// `at_cursor` starts the shift at the cursor row instead of the top
    /// margin (CSI L versus a margin-top scroll).
    pub fn insert_blank_lines(&mut self, n: usize, at_cursor: bool) {
        let top = if at_cursor {
            self.cursor.row.max(self.margin_top)
        } else {
            self.margin_top
        };
        if top >= self.margin_bot {
            return;
        }
        self.scroll_region_down(top, n);
    }

    /// Delete `n` lines at the cursor, shifting rows up within the margins.
    pub fn delete_lines(&mut self, n: usize) {
        let top = self.cursor.row.max(self.margin_top);
        if top >= self.margin_bot {
            return;
        }
        self.scroll_region_up(top, n);
    }

    /// Insert `n` blank cells at the cursor, shifting the row tail right.
    pub fn insert_blank_chars(&mut self, n: usize) {
        let cols = self.size.cols;
        let col = self.cursor.col.min(cols);
        let n = n.min(cols - col);
        if n == 0 {
            return;
        }
        let row = self.row_mut(self.cursor.row as isize);
        row.copy_within(col..cols - n, col + n);
        row[col..col + n].fill(Cell::default());
    }

    /// Delete `n` cells at the cursor, shifting the row tail left.
    pub fn delete_chars(&mut self, n: usize) {
        let cols = self.size.cols;
        let col = self.cursor.col.min(cols);
        let n = n.min(cols - col);
        if n == 0 {
            return;
        }
        let row = self.row_mut(self.cursor.row as isize);
        row.copy_within(col + n..cols, col);
        row[cols - n..].fill(Cell::default());
    }

    /// Clear `n` cells starting at the cursor without shifting.
    pub fn erase_chars(&mut self, n: usize) {
        let cols = self.size.cols;
        let col = self.cursor.col.min(cols);
        let end = (col + n).min(cols);
        self.row_mut(self.cursor.row as isize)[col..end].fill(Cell::default());
    }

    /// Set scroll margins as 0-based top (inclusive) and bottom (exclusive).
    /// An invalid pair resets to the full view.
    pub fn set_scroll_margins(&mut self, top: usize, bot: usize) {
        if top < bot && bot <= self.size.rows {
            self.margin_top = top;
            self.margin_bot = bot;
        } else {
            trace!("rejecting scroll margins {}..{}", top, bot);
            self.margin_top = 0;
            self.margin_bot = self.size.rows;
        }
    }

    pub fn set_private_mode(&mut self, mode: PrivateMode, on: bool) {
        self.modes.set(mode, on);
    }

    pub fn mode(&self, mode: PrivateMode) -> bool {
        self.modes.contains(mode)
    }

    /// The whole active-mode set; used to carry modes across a resize.
    pub fn modes(&self) -> ModeSet {
        self.modes
    }

    pub fn set_modes(&mut self, modes: ModeSet) {
        self.modes = modes;
    }

    /// Clear every view row. Scrollback is untouched.
    pub fn clear(&mut self) {
        for r in 0..self.size.rows {
            self.clear_row(r as isize);
        }
    }

    // ------------------------------------------------------------------
    // Reflow
    // ------------------------------------------------------------------

    /// Replay this grid's content into `target`, which may have a different
    /// size. Rows whose first cell carries the continuation flag are joined
    /// to the previous row before replay, so wrap decisions are re-made at
    /// the target's width.
    pub fn reflow_into(&self, target: &mut Grid) {
        let mut first = true;
        for r in -(self.scrollback_len as isize)..=self.cursor.row as isize {
            let row = self.row(r);
            let occupied = row
                .iter()
                .rposition(|cell| !cell.is_blank())
                .map_or(0, |i| i + 1);
            let continues = row[0].flags.contains(CellFlags::LINE_CONTINUATION);

            if !continues && !first {
                target.carriage_return();
                target.linefeed();
            }
            first = false;

            for cell in &row[..occupied] {
                // Wide-glyph spacers are recreated by writing the glyph.
                if cell.is_wide_spacer() {
                    continue;
                }
                target.cursor.brush = cell.style;
                target.cursor.anchored = cell.flags.contains(CellFlags::LINE_CONTINUATION);
                target.write(cell.ch);
            }
        }
    }
}
