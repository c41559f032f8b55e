//! Cursor state for terminal emulation.
//!
//! The cursor tracks:
//! - Current position (row, column)
//! - The write brush (style applied to newly written cells)
//! - The anchored bit that records whether the cursor sits immediately
//!   after previously written output (drives soft-wrap bookkeeping)
//! - Visual shape (block, underline, bar)

use serde::{Deserialize, Serialize};

use crate::cell::Style;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CursorShape {
    #[default]
    Block,
    Underline,
    Bar,
}

impl CursorShape {
    /// Map a DECSCUSR parameter to a shape. 0 is "default".
    pub fn from_decscusr(param: u16) -> Self {
        match param {
            3 | 4 => CursorShape::Underline,
            5 | 6 => CursorShape::Bar,
            _ => CursorShape::Block,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub row: usize,
    pub col: usize,
    /// Style applied to cells written at this cursor.
    pub brush: Style,
    /// True when the cursor sits directly after output it produced; cells
    /// written while anchored carry the line-continuation flag, letting
    /// reflow rejoin them. Cleared by explicit cursor motion.
    pub anchored: bool,
    pub shape: CursorShape,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor {
            row: 0,
            col: 0,
            brush: Style::default(),
            anchored: false,
            shape: CursorShape::Block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_default() {
        let cursor = Cursor::default();
        assert_eq!((cursor.row, cursor.col), (0, 0));
        assert!(!cursor.anchored);
        assert_eq!(cursor.shape, CursorShape::Block);
    }

    #[test]
    fn test_shape_from_decscusr() {
        assert_eq!(CursorShape::from_decscusr(0), CursorShape::Block);
        assert_eq!(CursorShape::from_decscusr(2), CursorShape::Block);
        assert_eq!(CursorShape::from_decscusr(4), CursorShape::Underline);
        assert_eq!(CursorShape::from_decscusr(6), CursorShape::Bar);
    }
}
