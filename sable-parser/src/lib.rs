//! Sable Terminal Parser
//!
//! A streaming, restartable parser for the ANSI/ECMA-48 terminal byte
//! protocol with UTF-8 text. The parser is a pure function over a byte
//! slice: it either consumes a whole command or reports how many bytes it
//! needs to decide, and the caller re-invokes it when more arrive.
//!
//! The parser is designed to:
//! - Handle arbitrary chunk boundaries (streaming)
//! - Be deterministic and never desynchronise on malformed input
//! - Consume a bounded prefix for every invalid sequence
//!
//! References:
//! - ECMA-48: https://ecma-international.org/wp-content/uploads/ECMA-48_5th_edition_june_1991.pdf
//! - XTerm Control Sequences: https://invisible-island.net/xterm/ctlseqs/ctlseqs.pdf

pub mod command;
pub mod params;
pub mod parser;

pub use command::Command;
pub use params::{Params, MAX_PARAMS};
pub use parser::parse;
