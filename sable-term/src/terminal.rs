//! The interpreter: shell bytes in, grid mutations and shell replies out.
//!
//! Owns the grid, the residual bytes of incomplete escape sequences, and the
//! queue of bytes waiting to go back to the shell (key input, paste, and
//! query replies). Printable ASCII runs bypass the parser entirely; the
//! parser is only consulted at the first non-printable byte.

use std::collections::VecDeque;

use log::{debug, trace, warn};
use sable_core::{
    Color, Cursor, CursorShape, EraseDisplay, EraseLine, Grid, PrivateMode, Rgb, Size, StyleFlags,
};
use sable_parser::{parse, Command, Params};

/// Titles longer than this are truncated on a char boundary.
const MAX_TITLE_LEN: usize = 1024;

/// Primary device attributes: VT102.
const DEVICE_ATTRIBUTES: &[u8] = b"\x1b[?6c";

/// Bracketed paste markers (mode 2004).
const PASTE_BEGIN: &[u8] = b"\x1b[200~";
const PASTE_END: &[u8] = b"\x1b[201~";

pub struct Terminal {
    grid: Grid,
    params: Params,
    /// Unconsumed tail of the last read, kept while a sequence is incomplete.
    pending: Vec<u8>,
    /// Bytes queued for the shell.
    output: VecDeque<u8>,
    /// Window title as last set by OSC 0/2.
    pub title: String,
    /// The grid changed since the last render.
    dirty: bool,
    /// Saved primary screen while the alternate screen (mode 1049) is live.
    saved_primary: Option<(Grid, Cursor)>,
    /// Cursor saved by ESC 7 / restored by ESC 8.
    saved_cursor: Option<Cursor>,
}

impl Terminal {
    pub fn new(size: Size) -> Self {
        Terminal {
            grid: Grid::new(size),
            params: Params::new(),
            pending: Vec::new(),
            output: VecDeque::new(),
            title: String::new(),
            dirty: true,
            saved_primary: None,
            saved_cursor: None,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// The queue of bytes awaiting delivery to the shell.
    pub fn output(&self) -> &VecDeque<u8> {
        &self.output
    }

    pub fn take_output(&mut self, n: usize) {
        self.output.drain(..n.min(self.output.len()));
    }

    /// Enqueue key-derived bytes for the shell.
    pub fn input_bytes(&mut self, bytes: &[u8]) {
        self.output.extend(bytes);
    }

    /// Enqueue pasted text, wrapped in bracketed-paste markers when the
    /// shell asked for them.
    pub fn paste(&mut self, text: &str) {
        if self.grid.mode(PrivateMode::BracketedPaste) {
            self.output.extend(PASTE_BEGIN);
            self.output.extend(text.as_bytes());
            self.output.extend(PASTE_END);
        } else {
            self.output.extend(text.as_bytes());
        }
    }

    /// Replace the grid with one of a new size, replaying the old content.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let old = self.grid.size();
        if (old.cols, old.rows) == (cols, rows) {
            return;
        }
        let mut next = Grid::new(Size::new(cols, rows, old.scrollback_rows));
        next.set_modes(self.grid.modes());
        self.grid.reflow_into(&mut next);
        self.grid = next;

        if let Some((saved, cursor)) = self.saved_primary.take() {
            let mut next = Grid::new(Size::new(cols, rows, saved.size().scrollback_rows));
            next.set_modes(saved.modes());
            saved.reflow_into(&mut next);
            let mut cursor = cursor;
            cursor.row = cursor.row.min(rows.saturating_sub(1));
            cursor.col = cursor.col.min(cols.saturating_sub(1));
            self.saved_primary = Some((next, cursor));
        }
        self.dirty = true;
    }

    /// Interpret a chunk of shell output.
    pub fn process_bytes(&mut self, bytes: &[u8]) {
        if self.pending.is_empty() {
            self.advance(bytes);
        } else {
            // Prepend the incomplete tail from the previous read so the
            // parser sees the whole sequence from its first byte.
            let mut buf = std::mem::take(&mut self.pending);
            buf.extend_from_slice(bytes);
            self.advance(&buf);
        }
    }

    fn advance(&mut self, buf: &[u8]) {
        let mut offset = 0;
        while offset < buf.len() {
            // Fast path: write printable ASCII straight into the grid.
            while offset < buf.len() && (0x20..=0x7E).contains(&buf[offset]) {
                self.grid.write(buf[offset] as char);
                offset += 1;
                self.dirty = true;
            }
            if offset >= buf.len() {
                return;
            }

            let (consumed, command) = parse(&buf[offset..], &mut self.params);
            if command.is_incomplete() {
                self.pending = buf[offset..].to_vec();
                return;
            }
            self.apply(command, &buf[offset..]);
            offset += consumed.max(1);
            self.dirty = true;
        }
    }

    fn apply(&mut self, command: Command, input: &[u8]) {
        match command {
            Command::Codepoint(c) => self.grid.write(c),
            Command::Invalid => self.grid.write('\u{FFFD}'),
            Command::Ignore => {}

            Command::Tab => self.grid.tab(),
            Command::CarriageReturn => self.grid.carriage_return(),
            Command::LineFeed => self.grid.linefeed(),
            Command::Backspace => self.grid.move_cols(-1),
            Command::Delete => {}
            Command::Bell => trace!("bell"),

            Command::Index => self.grid.linefeed(),
            Command::NextLine => {
                self.grid.carriage_return();
                self.grid.linefeed();
            }
            Command::ReverseIndex => self.grid.reverse_linefeed(),
            Command::ReturnTerminalId => self.reply(DEVICE_ATTRIBUTES),
            Command::SaveCursor => self.saved_cursor = Some(self.grid.cursor),
            Command::RestoreCursor => {
                if let Some(saved) = self.saved_cursor {
                    self.grid.cursor.brush = saved.brush;
                    self.grid.cursor.shape = saved.shape;
                    self.grid.move_to(saved.row, saved.col);
                }
            }

            Command::Csi {
                intermediate,
                final_byte,
            } => self.csi_dispatch(intermediate, final_byte),
            Command::Osc { arg_min, arg_max } => {
                let payload = &input[arg_min..arg_max];
                self.osc_dispatch(payload);
            }

            // Accepted without effect.
            Command::SetCharacterSet
            | Command::SingleShift
            | Command::TabSet
            | Command::NormalKeypad
            | Command::ApplicationKeypad
            | Command::StringTerminator => {}

            Command::DeviceControl
            | Command::GuardedArea
            | Command::StartOfString
            | Command::PrivacyMessage
            | Command::ApplicationProgramCommand => {
                trace!("ignored string sequence {:?}", command)
            }

            Command::Incomplete { .. } => unreachable!("handled by advance"),
        }
    }

    fn reply(&mut self, bytes: &[u8]) {
        self.output.extend(bytes);
    }

    // ------------------------------------------------------------------
    // CSI
    // ------------------------------------------------------------------

    fn csi_dispatch(&mut self, intermediate: Option<u8>, final_byte: u8) {
        let n = self.params.get_nonzero_or(0, 1) as usize;
        match (intermediate, final_byte) {
            (Some(b'?'), b'h') => self.private_modes(true),
            (Some(b'?'), b'l') => self.private_modes(false),

            (None, b'm') => self.sgr(),

            (None, b'@') => self.grid.insert_blank_chars(n),
            (None, b'A') => self.grid.move_rows(-(n as isize)),
            (None, b'B') => self.grid.move_rows(n as isize),
            (None, b'C') => self.grid.move_cols(n as isize),
            (None, b'D') => self.grid.move_cols(-(n as isize)),
            (None, b'H') => {
                // 1-based row;col, clamped by the grid.
                let row = self.params.get_nonzero_or(0, 1) as usize;
                let col = self.params.get_nonzero_or(1, 1) as usize;
                self.grid.move_to(row - 1, col - 1);
            }
            (None, b'J') => match self.params.get_or(0, 0) {
                0 => self.grid.erase_in_display(EraseDisplay::Below),
                1 => self.grid.erase_in_display(EraseDisplay::Above),
                2 | 3 => self.grid.erase_in_display(EraseDisplay::All),
                other => debug!("unhandled ED mode {}", other),
            },
            (None, b'K') => match self.params.get_or(0, 0) {
                0 => self.grid.erase_in_line(EraseLine::Right),
                1 => self.grid.erase_in_line(EraseLine::Left),
                2 => self.grid.erase_in_line(EraseLine::All),
                other => debug!("unhandled EL mode {}", other),
            },
            (None, b'L') => self.grid.insert_blank_lines(n, true),
            (None, b'M') => self.grid.delete_lines(n),
            (None, b'P') => self.grid.delete_chars(n),
            (None, b'X') => self.grid.erase_chars(n),

            (Some(b' '), b'q') => {
                let shape = CursorShape::from_decscusr(self.params.get_or(0, 0));
                self.grid.cursor.shape = shape;
            }
            (None, b'r') => {
                let rows = self.grid.rows() as u16;
                let top = self.params.get_nonzero_or(0, 1);
                // An absent bottom means the bottom of the view.
                let bot = self.params.get_nonzero_or(1, rows).min(rows);
                self.grid
                    .set_scroll_margins(top as usize - 1, bot as usize);
            }

            (None, b'c') => self.reply(DEVICE_ATTRIBUTES),
            (None, b'n') => {
                if self.params.get_or(0, 0) == 6 {
                    let row = self.grid.cursor.row + 1;
                    let col = self.grid.cursor.col.min(self.grid.cols() - 1) + 1;
                    let report = format!("\x1b[{};{}R", row, col);
                    self.reply(report.as_bytes());
                }
            }

            // Progressive keyboard enhancement queries: accepted, ignored.
            (Some(b'='), b'u') | (Some(b'>'), b'u') | (Some(b'?'), b'u') => {}

            // ANSI set/reset mode: nothing we act on.
            (None, b'h') | (None, b'l') => {
                debug!("ignored ANSI mode {:?}", self.params)
            }

            _ => debug!(
                "unimplemented CSI {:?} {:?} final={}",
                intermediate.map(|b| b as char),
                self.params,
                final_byte as char
            ),
        }
    }

    fn private_modes(&mut self, on: bool) {
        let codes: Vec<u16> = self.params.iter().flatten().collect();
        for code in codes {
            match PrivateMode::from_code(code) {
                Some(PrivateMode::AlternateScreen) => {
                    if on {
                        self.enter_alternate_screen();
                    } else {
                        self.leave_alternate_screen();
                    }
                }
                Some(mode) => self.grid.set_private_mode(mode, on),
                None => debug!("unhandled private mode {} (set={})", code, on),
            }
        }
    }

    fn enter_alternate_screen(&mut self) {
        if self.saved_primary.is_some() {
            return;
        }
        let size = self.grid.size();
        let mut alternate = Grid::new(Size::new(size.cols, size.rows, 0));
        alternate.cursor.brush = self.grid.cursor.brush;
        alternate.set_private_mode(PrivateMode::AlternateScreen, true);
        let primary = std::mem::replace(&mut self.grid, alternate);
        let cursor = primary.cursor;
        self.saved_primary = Some((primary, cursor));
    }

    fn leave_alternate_screen(&mut self) {
        if let Some((primary, cursor)) = self.saved_primary.take() {
            self.grid = primary;
            self.grid.cursor = cursor;
        }
    }

    // ------------------------------------------------------------------
    // SGR
    // ------------------------------------------------------------------

    fn sgr(&mut self) {
        if self.params.is_empty() {
            self.grid.cursor.brush.reset();
            return;
        }
        let mut i = 0;
        while i < self.params.len() {
            let brush = &mut self.grid.cursor.brush;
            match self.params.get_or(i, 0) {
                0 => brush.reset(),
                1 => brush.flags.set(StyleFlags::BOLD, true),
                22 => brush.flags.set(StyleFlags::BOLD, false),
                3 => brush.flags.set(StyleFlags::ITALIC, true),
                23 => brush.flags.set(StyleFlags::ITALIC, false),
                4 => brush.flags.set(StyleFlags::UNDERLINE, true),
                24 => brush.flags.set(StyleFlags::UNDERLINE, false),
                7 => brush.flags.set(StyleFlags::INVERSE, true),
                27 => brush.flags.set(StyleFlags::INVERSE, false),

                c @ 30..=37 => brush.fg = Color::Indexed((c - 30) as u8),
                39 => brush.fg = Color::Default,
                c @ 40..=47 => brush.bg = Color::Indexed((c - 40) as u8),
                49 => brush.bg = Color::Default,
                c @ 90..=97 => brush.fg = Color::Indexed((c - 90 + 8) as u8),
                c @ 100..=107 => brush.bg = Color::Indexed((c - 100 + 8) as u8),

                which @ (38 | 48) => match extended_color(&self.params, i) {
                    Some((color, advance)) => {
                        if which == 38 {
                            brush.fg = color;
                        } else {
                            brush.bg = color;
                        }
                        i += advance;
                    }
                    None => {
                        debug!("malformed SGR {} at {:?}", which, self.params);
                        return;
                    }
                },

                other => {
                    debug!("unhandled SGR code {}", other);
                    return;
                }
            }
            i += 1;
        }
    }

    // ------------------------------------------------------------------
    // OSC
    // ------------------------------------------------------------------

    fn osc_dispatch(&mut self, payload: &[u8]) {
        match self.params.get(0) {
            Some(0) | Some(2) | None => {
                let mut title = String::from_utf8_lossy(payload).into_owned();
                if title.len() > MAX_TITLE_LEN {
                    let mut cut = MAX_TITLE_LEN;
                    while !title.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    title.truncate(cut);
                }
                self.title = title;
            }
            // Hyperlinks: accepted, not rendered.
            Some(8) => trace!("OSC 8 hyperlink ignored"),
            Some(code) => warn!("unhandled OSC {}", code),
        }
    }
}

/// SGR 38/48 extension at parameter `i`: `2;r;g;b` or `5;index`.
/// Returns the color and how many extra parameters were consumed.
fn extended_color(params: &Params, i: usize) -> Option<(Color, usize)> {
    match params.get(i + 1)? {
        2 => {
            let r = params.get(i + 2)?;
            let g = params.get(i + 3)?;
            let b = params.get(i + 4)?;
            if r > 255 || g > 255 || b > 255 {
                return None;
            }
            Some((Color::Rgb(Rgb::new(r as u8, g as u8, b as u8)), 4))
        }
        5 => {
            let index = params.get(i + 2)?;
            if index > 255 {
                return None;
            }
            Some((Color::Indexed(index as u8), 2))
        }
        _ => None,
    }
}
