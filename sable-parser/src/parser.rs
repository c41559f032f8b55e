//! The parse function.
//!
//! `parse` inspects the head of a byte slice and returns the number of bytes
//! consumed plus the command they encode. It holds no state of its own: the
//! residual bytes of an incomplete sequence stay in the caller's buffer and
//! the whole sequence is re-parsed once more input arrives, so a command is
//! only ever produced from a complete encoding.

use crate::command::{c0, Command};
use crate::params::Params;

/// Leading CSI intermediates (before any parameter digit).
const CSI_LEADERS: [u8; 4] = [b'?', b'>', b' ', b'='];

/// Parse one command from the head of `bytes`.
///
/// The context is cleared and repopulated on every invocation; on
/// `Incomplete` the caller must keep the unconsumed bytes and call again
/// with at least `need` bytes available.
pub fn parse(bytes: &[u8], params: &mut Params) -> (usize, Command) {
    params.clear();

    let Some(&first) = bytes.first() else {
        return (0, Command::Incomplete { need: 1 });
    };

    match first {
        c0::NUL => (1, Command::Ignore),
        c0::BEL => (1, Command::Bell),
        c0::BS => (1, Command::Backspace),
        c0::HT => (1, Command::Tab),
        c0::LF => (1, Command::LineFeed),
        c0::CR => (1, Command::CarriageReturn),
        c0::DEL => (1, Command::Delete),
        c0::ESC => parse_escape(bytes, params),
        0x20..=0x7E => (1, Command::Codepoint(first as char)),
        0xC2..=0xF4 => parse_utf8(bytes),
        _ => (1, Command::Invalid),
    }
}

fn parse_escape(bytes: &[u8], params: &mut Params) -> (usize, Command) {
    if bytes.len() < 2 {
        return (0, Command::Incomplete { need: 2 });
    }
    match bytes[1] {
        b'[' => parse_csi(bytes, params),
        b']' => parse_osc(bytes, params),
        b'D' => (2, Command::Index),
        b'E' => (2, Command::NextLine),
        b'H' => (2, Command::TabSet),
        b'M' => (2, Command::ReverseIndex),
        b'N' | b'O' => (2, Command::SingleShift),
        b'P' => (2, Command::DeviceControl),
        b'V' | b'W' => (2, Command::GuardedArea),
        b'X' => (2, Command::StartOfString),
        b'Z' => (2, Command::ReturnTerminalId),
        b'\\' => (2, Command::StringTerminator),
        b'^' => (2, Command::PrivacyMessage),
        b'_' => (2, Command::ApplicationProgramCommand),
        b'>' => (2, Command::NormalKeypad),
        b'=' => (2, Command::ApplicationKeypad),
        b'7' => (2, Command::SaveCursor),
        b'8' => (2, Command::RestoreCursor),
        0x20..=0x2F => parse_charset(bytes),
        _ => (2, Command::Invalid),
    }
}

/// ESC 0x20-0x2F ... : character-set selection. Intermediates accumulate in
/// 0x20-0x2F and a byte in 0x30-0x7E terminates the sequence.
fn parse_charset(bytes: &[u8]) -> (usize, Command) {
    let mut i = 2;
    loop {
        let Some(&b) = bytes.get(i) else {
            return (0, Command::Incomplete { need: i + 1 });
        };
        match b {
            0x20..=0x2F => i += 1,
            0x30..=0x7E => return (i + 1, Command::SetCharacterSet),
            _ => return (i + 1, Command::Invalid),
        }
    }
}

/// ESC [ : optional leading intermediate, `;`/`:`-separated decimal
/// parameters (empty entries stay absent), optional trailing intermediate,
/// final byte in 0x40-0x7E.
fn parse_csi(bytes: &[u8], params: &mut Params) -> (usize, Command) {
    let mut i = 2;
    let mut intermediate = None;

    if let Some(&b) = bytes.get(i) {
        if CSI_LEADERS.contains(&b) {
            intermediate = Some(b);
            i += 1;
        }
    }

    let mut value: u16 = 0;
    let mut has_digits = false;
    let mut has_separator = false;
    loop {
        let Some(&b) = bytes.get(i) else {
            return (0, Command::Incomplete { need: i + 1 });
        };
        match b {
            b'0'..=b'9' => {
                value = value.saturating_mul(10).saturating_add((b - b'0') as u16);
                has_digits = true;
                i += 1;
            }
            b';' | b':' => {
                if has_digits {
                    params.push(value);
                } else {
                    params.push_empty();
                }
                value = 0;
                has_digits = false;
                has_separator = true;
                i += 1;
            }
            _ => break,
        }
    }
    if has_digits {
        params.push(value);
    } else if has_separator {
        params.push_empty();
    }

    // Trailing intermediate, e.g. the space in DECSCUSR (CSI Ps SP q).
    if let Some(&b) = bytes.get(i) {
        if (0x20..=0x2F).contains(&b) {
            if intermediate.is_none() {
                intermediate = Some(b);
            }
            i += 1;
        }
    }

    match bytes.get(i) {
        None => (0, Command::Incomplete { need: i + 1 }),
        Some(&b) if (0x40..=0x7E).contains(&b) => (
            i + 1,
            Command::Csi {
                intermediate,
                final_byte: b,
            },
        ),
        Some(_) => (i + 1, Command::Invalid),
    }
}

/// ESC ] : leading numeric code, `;`, then an uninterpreted payload
/// terminated by STX, BEL or ST (ESC \). The payload is reported as offsets
/// so the caller can slice it out of its buffer.
fn parse_osc(bytes: &[u8], params: &mut Params) -> (usize, Command) {
    let mut i = 2;

    let mut value: u16 = 0;
    let mut has_digits = false;
    while let Some(&b) = bytes.get(i) {
        if b.is_ascii_digit() {
            value = value.saturating_mul(10).saturating_add((b - b'0') as u16);
            has_digits = true;
            i += 1;
        } else {
            break;
        }
    }
    if has_digits {
        params.push(value);
    }
    if let Some(b';') = bytes.get(i) {
        i += 1;
    }
    let arg_min = i;

    loop {
        let Some(&b) = bytes.get(i) else {
            return (0, Command::Incomplete { need: i + 1 });
        };
        match b {
            c0::STX | c0::BEL => {
                return (
                    i + 1,
                    Command::Osc {
                        arg_min,
                        arg_max: i,
                    },
                )
            }
            c0::ESC => {
                let Some(&next) = bytes.get(i + 1) else {
                    return (0, Command::Incomplete { need: i + 2 });
                };
                if next == b'\\' {
                    return (
                        i + 2,
                        Command::Osc {
                            arg_min,
                            arg_max: i,
                        },
                    );
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
}

/// Strictly-validated UTF-8 decode of one codepoint. Short input reports the
/// full sequence length; malformed sequences consume the detected bad prefix.
fn parse_utf8(bytes: &[u8]) -> (usize, Command) {
    let len = match bytes[0] {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return (1, Command::Invalid),
    };
    if bytes.len() < len {
        // An already-bad continuation byte need not wait for more input.
        if let Err(e) = std::str::from_utf8(&bytes[..bytes.len().min(len)]) {
            if let Some(bad) = e.error_len() {
                return (bad.max(1), Command::Invalid);
            }
        }
        return (0, Command::Incomplete { need: len });
    }
    match std::str::from_utf8(&bytes[..len]) {
        Ok(s) => match s.chars().next() {
            Some(c) => (len, Command::Codepoint(c)),
            None => (len, Command::Invalid),
        },
        Err(e) => (e.error_len().unwrap_or(1).max(1), Command::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the parser over a whole buffer, collecting commands.
    fn parse_all(input: &[u8]) -> Vec<Command> {
        let mut params = Params::new();
        let mut commands = Vec::new();
        let mut offset = 0;
        while offset < input.len() {
            let (consumed, command) = parse(&input[offset..], &mut params);
            if command.is_incomplete() {
                break;
            }
            assert!(consumed > 0, "non-incomplete command must consume bytes");
            commands.push(command);
            offset += consumed;
        }
        commands
    }

    #[test]
    fn test_printable_ascii() {
        let commands = parse_all(b"Hi");
        assert_eq!(
            commands,
            vec![Command::Codepoint('H'), Command::Codepoint('i')]
        );
    }

    #[test]
    fn test_control_bytes() {
        assert_eq!(
            parse_all(b"\x00\x07\x08\x09\x0a\x0d\x7f"),
            vec![
                Command::Ignore,
                Command::Bell,
                Command::Backspace,
                Command::Tab,
                Command::LineFeed,
                Command::CarriageReturn,
                Command::Delete,
            ]
        );
    }

    #[test]
    fn test_other_controls_are_invalid() {
        assert_eq!(parse_all(b"\x01\x0b"), vec![Command::Invalid; 2]);
    }

    #[test]
    fn test_csi_simple() {
        let mut params = Params::new();
        let (consumed, command) = parse(b"\x1b[5A", &mut params);
        assert_eq!(consumed, 4);
        assert_eq!(
            command,
            Command::Csi {
                intermediate: None,
                final_byte: b'A'
            }
        );
        assert_eq!(params.get(0), Some(5));
    }

    #[test]
    fn test_csi_empty_params_stay_absent() {
        let mut params = Params::new();
        let (consumed, command) = parse(b"\x1b[;5H", &mut params);
        assert_eq!(consumed, 5);
        assert!(matches!(command, Command::Csi { final_byte: b'H', .. }));
        assert_eq!(params.get(0), None);
        assert_eq!(params.get(1), Some(5));
    }

    #[test]
    fn test_csi_no_params() {
        let mut params = Params::new();
        let (_, command) = parse(b"\x1b[m", &mut params);
        assert!(matches!(command, Command::Csi { final_byte: b'm', .. }));
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn test_csi_private_intermediate() {
        let mut params = Params::new();
        let (consumed, command) = parse(b"\x1b[?2004h", &mut params);
        assert_eq!(consumed, 8);
        assert_eq!(
            command,
            Command::Csi {
                intermediate: Some(b'?'),
                final_byte: b'h'
            }
        );
        assert_eq!(params.get(0), Some(2004));
    }

    #[test]
    fn test_csi_trailing_intermediate() {
        let mut params = Params::new();
        let (consumed, command) = parse(b"\x1b[4 q", &mut params);
        assert_eq!(consumed, 5);
        assert_eq!(
            command,
            Command::Csi {
                intermediate: Some(b' '),
                final_byte: b'q'
            }
        );
        assert_eq!(params.get(0), Some(4));
    }

    #[test]
    fn test_csi_colon_separated() {
        let mut params = Params::new();
        let (_, command) = parse(b"\x1b[38:2:10:20:30m", &mut params);
        assert!(matches!(command, Command::Csi { final_byte: b'm', .. }));
        let values: Vec<_> = params.iter().collect();
        assert_eq!(
            values,
            vec![Some(38), Some(2), Some(10), Some(20), Some(30)]
        );
    }

    #[test]
    fn test_csi_param_saturates() {
        let mut params = Params::new();
        let (_, command) = parse(b"\x1b[99999999999m", &mut params);
        assert!(matches!(command, Command::Csi { final_byte: b'm', .. }));
        assert_eq!(params.get(0), Some(u16::MAX));
    }

    #[test]
    fn test_csi_restart() {
        // The classic split: "\x1b[3" then "8;5;200m".
        let mut params = Params::new();
        let (consumed, command) = parse(b"\x1b[3", &mut params);
        assert_eq!(consumed, 0);
        assert_eq!(command, Command::Incomplete { need: 4 });

        let (consumed, command) = parse(b"\x1b[38;5;200m", &mut params);
        assert_eq!(consumed, 11);
        assert_eq!(
            command,
            Command::Csi {
                intermediate: None,
                final_byte: b'm'
            }
        );
        let values: Vec<_> = params.iter().collect();
        assert_eq!(values, vec![Some(38), Some(5), Some(200)]);
    }

    #[test]
    fn test_esc_singles() {
        assert_eq!(parse_all(b"\x1bD"), vec![Command::Index]);
        assert_eq!(parse_all(b"\x1bM"), vec![Command::ReverseIndex]);
        assert_eq!(parse_all(b"\x1bE"), vec![Command::NextLine]);
        assert_eq!(parse_all(b"\x1bZ"), vec![Command::ReturnTerminalId]);
        assert_eq!(parse_all(b"\x1b="), vec![Command::ApplicationKeypad]);
        assert_eq!(parse_all(b"\x1b>"), vec![Command::NormalKeypad]);
        assert_eq!(parse_all(b"\x1b7"), vec![Command::SaveCursor]);
    }

    #[test]
    fn test_esc_needs_two_bytes() {
        let mut params = Params::new();
        assert_eq!(
            parse(b"\x1b", &mut params),
            (0, Command::Incomplete { need: 2 })
        );
    }

    #[test]
    fn test_charset_selection() {
        let mut params = Params::new();
        assert_eq!(
            parse(b"\x1b(B", &mut params),
            (3, Command::SetCharacterSet)
        );
        // Accumulating intermediates before the terminator.
        assert_eq!(
            parse(b"\x1b(%0", &mut params),
            (4, Command::SetCharacterSet)
        );
        assert_eq!(
            parse(b"\x1b(", &mut params),
            (0, Command::Incomplete { need: 3 })
        );
    }

    #[test]
    fn test_osc_bel_terminated() {
        let mut params = Params::new();
        let input = b"\x1b]0;hello\x07";
        let (consumed, command) = parse(input, &mut params);
        assert_eq!(consumed, input.len());
        assert_eq!(
            command,
            Command::Osc {
                arg_min: 4,
                arg_max: 9
            }
        );
        assert_eq!(params.get(0), Some(0));
        assert_eq!(&input[4..9], b"hello");
    }

    #[test]
    fn test_osc_st_terminated() {
        let mut params = Params::new();
        let input = b"\x1b]2;title\x1b\\";
        let (consumed, command) = parse(input, &mut params);
        assert_eq!(consumed, input.len());
        let Command::Osc { arg_min, arg_max } = command else {
            panic!("expected OSC, got {:?}", command);
        };
        assert_eq!(&input[arg_min..arg_max], b"title");
        assert_eq!(params.get(0), Some(2));
    }

    #[test]
    fn test_osc_incomplete() {
        let mut params = Params::new();
        let (consumed, command) = parse(b"\x1b]0;par", &mut params);
        assert_eq!(consumed, 0);
        assert!(command.is_incomplete());
    }

    #[test]
    fn test_utf8_valid() {
        assert_eq!(
            parse_all("é世🦀".as_bytes()),
            vec![
                Command::Codepoint('é'),
                Command::Codepoint('世'),
                Command::Codepoint('🦀'),
            ]
        );
    }

    #[test]
    fn test_utf8_incomplete() {
        let mut params = Params::new();
        let bytes = "世".as_bytes();
        assert_eq!(
            parse(&bytes[..1], &mut params),
            (0, Command::Incomplete { need: 3 })
        );
        assert_eq!(
            parse(&bytes[..2], &mut params),
            (0, Command::Incomplete { need: 3 })
        );
        assert_eq!(parse(bytes, &mut params), (3, Command::Codepoint('世')));
    }

    #[test]
    fn test_utf8_invalid() {
        let mut params = Params::new();
        // Overlong leader, lone continuation, out-of-range leader.
        for bad in [&b"\xc0\xaf"[..], &b"\x80"[..], &b"\xff"[..]] {
            let (consumed, command) = parse(bad, &mut params);
            assert_eq!(command, Command::Invalid, "input {:x?}", bad);
            assert!(consumed >= 1 && consumed <= 4);
        }
        // Truncated sequence followed by a new leader: bounded invalid.
        let (consumed, command) = parse(b"\xe4\x41", &mut params);
        assert_eq!(command, Command::Invalid);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_prefix_parsing_yields_prefix_of_commands() {
        // Parsing any prefix produces a proper prefix of the full command
        // stream plus at most one trailing incomplete.
        let input: &[u8] = b"ab\x1b[1;31mc\x1b]0;t\x07d\xc3\xa9";
        let full = parse_all(input);
        for cut in 0..input.len() {
            let partial = parse_all(&input[..cut]);
            assert!(
                partial.len() <= full.len(),
                "prefix produced more commands"
            );
            assert_eq!(&full[..partial.len()], &partial[..], "cut at {}", cut);
        }
    }
}
