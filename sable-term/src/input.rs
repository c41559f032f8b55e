//! Keyboard input: shortcut dispatch and key-to-bytes encoding.
//!
//! Keys arrive from the window system already translated to a key token
//! plus modifiers. Shortcuts are checked first; a matched shortcut consumes
//! the key and no bytes reach the shell.

/// Modifier state at the time of a key press.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

/// A key token, post window-system translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
}

/// Emulator-level actions bound to key chords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    CloseWindow,
    FontSmaller,
    FontLarger,
    Paste,
}

/// The fixed binding table. Matched chords suppress text input.
pub fn shortcut(key: Key, mods: Modifiers) -> Option<Shortcut> {
    match key {
        Key::Escape if mods.shift => Some(Shortcut::CloseWindow),
        Key::Char('1') if mods.ctrl && !mods.shift => Some(Shortcut::FontSmaller),
        Key::Char('2') if mods.ctrl && !mods.shift => Some(Shortcut::FontLarger),
        Key::Char('v') | Key::Char('V') if mods.ctrl && mods.shift => Some(Shortcut::Paste),
        _ => None,
    }
}

/// Encode a key press as the byte sequence the shell expects.
pub fn encode_key(key: Key, mods: Modifiers) -> Vec<u8> {
    match key {
        Key::Char(c) => encode_char(c, mods),
        Key::Enter => vec![b'\r'],
        Key::Tab => vec![b'\t'],
        Key::Backspace => vec![0x7f],
        Key::Escape => vec![0x1b],
        Key::Up => b"\x1b[A".to_vec(),
        Key::Down => b"\x1b[B".to_vec(),
        Key::Right => b"\x1b[C".to_vec(),
        Key::Left => b"\x1b[D".to_vec(),
        Key::Home => b"\x1b[H".to_vec(),
        Key::End => b"\x1b[F".to_vec(),
        Key::PageUp => b"\x1b[5~".to_vec(),
        Key::PageDown => b"\x1b[6~".to_vec(),
        Key::Insert => b"\x1b[2~".to_vec(),
        Key::Delete => b"\x1b[3~".to_vec(),
    }
}

fn encode_char(c: char, mods: Modifiers) -> Vec<u8> {
    // Ctrl + letter produces the corresponding C0 control code.
    if mods.ctrl && c.is_ascii_alphabetic() {
        let code = c.to_ascii_lowercase() as u8 - b'a' + 1;
        return vec![code];
    }

    let mut bytes = Vec::with_capacity(5);
    if mods.alt {
        bytes.push(0x1b);
    }
    let mut utf8 = [0u8; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
    };
    const CTRL: Modifiers = Modifiers {
        shift: false,
        ctrl: true,
        alt: false,
    };
    const CTRL_SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: true,
        alt: false,
    };
    const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
        alt: false,
    };

    #[test]
    fn test_shortcut_table() {
        assert_eq!(shortcut(Key::Escape, SHIFT), Some(Shortcut::CloseWindow));
        assert_eq!(shortcut(Key::Escape, NONE), None);
        assert_eq!(shortcut(Key::Char('1'), CTRL), Some(Shortcut::FontSmaller));
        assert_eq!(shortcut(Key::Char('2'), CTRL), Some(Shortcut::FontLarger));
        assert_eq!(shortcut(Key::Char('V'), CTRL_SHIFT), Some(Shortcut::Paste));
        assert_eq!(shortcut(Key::Char('v'), CTRL), None);
    }

    #[test]
    fn test_ctrl_letters() {
        assert_eq!(encode_key(Key::Char('a'), CTRL), vec![0x01]);
        assert_eq!(encode_key(Key::Char('C'), CTRL), vec![0x03]);
        assert_eq!(encode_key(Key::Char('z'), CTRL), vec![0x1a]);
    }

    #[test]
    fn test_plain_and_alt_chars() {
        assert_eq!(encode_key(Key::Char('x'), NONE), b"x".to_vec());
        assert_eq!(encode_key(Key::Char('é'), NONE), "é".as_bytes().to_vec());
        let alt = Modifiers {
            alt: true,
            ..NONE
        };
        assert_eq!(encode_key(Key::Char('f'), alt), b"\x1bf".to_vec());
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(encode_key(Key::Enter, NONE), b"\r".to_vec());
        assert_eq!(encode_key(Key::Up, NONE), b"\x1b[A".to_vec());
        assert_eq!(encode_key(Key::Delete, NONE), b"\x1b[3~".to_vec());
        assert_eq!(encode_key(Key::Backspace, NONE), vec![0x7f]);
    }
}
