//! Sable Terminal Core
//!
//! This crate provides the platform-independent screen model:
//! - Styled cells with soft-wrap bookkeeping
//! - A ring-buffered grid with scrollback and scroll margins
//! - Cursor state including the write brush
//! - Reflow of wrapped content into a grid of a different size
//!
//! This crate has NO GUI dependencies and can be used headlessly for testing.

pub mod cell;
pub mod color;
pub mod cursor;
pub mod grid;
pub mod modes;

pub use cell::{Cell, CellFlags, Style, StyleFlags};
pub use color::{xterm_palette, Color, Rgb};
pub use cursor::{Cursor, CursorShape};
pub use grid::{EraseDisplay, EraseLine, Grid, Size};
pub use modes::{ModeSet, PrivateMode};

/// Default number of scrollback rows kept above the view.
pub const DEFAULT_SCROLLBACK_ROWS: usize = 10_000;
