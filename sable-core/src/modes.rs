//! Private (DEC) mode tracking.
//!
//! Modes are numerically coded booleans toggled by `CSI ? Pm h` / `l`.
//! Only the modes the emulator acts on are represented; unknown codes are
//! reported to the caller so the interpreter can log them.

use serde::{Deserialize, Serialize};

/// Private modes the emulator recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivateMode {
    /// DECTCEM - text cursor visible (mode 25)
    CursorVisible,
    /// Alternate screen buffer with cursor save/restore (mode 1049)
    AlternateScreen,
    /// Bracketed paste (mode 2004)
    BracketedPaste,
}

impl PrivateMode {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            25 => Some(PrivateMode::CursorVisible),
            1049 => Some(PrivateMode::AlternateScreen),
            2004 => Some(PrivateMode::BracketedPaste),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            PrivateMode::CursorVisible => 1 << 0,
            PrivateMode::AlternateScreen => 1 << 1,
            PrivateMode::BracketedPaste => 1 << 2,
        }
    }
}

/// The set of currently active private modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSet {
    bits: u8,
}

impl Default for ModeSet {
    fn default() -> Self {
        // The cursor starts visible.
        let mut modes = ModeSet { bits: 0 };
        modes.set(PrivateMode::CursorVisible, true);
        modes
    }
}

impl ModeSet {
    pub fn set(&mut self, mode: PrivateMode, on: bool) {
        if on {
            self.bits |= mode.bit();
        } else {
            self.bits &= !mode.bit();
        }
    }

    pub fn contains(&self, mode: PrivateMode) -> bool {
        self.bits & mode.bit() != 0
    }
}
