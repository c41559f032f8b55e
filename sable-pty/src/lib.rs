//! Sable Terminal PTY
//!
//! Pseudo-terminal plumbing on Unix:
//! - Opening a master/slave pair with `posix_openpt`
//! - Spawning the user's shell attached to the slave
//! - Window-size propagation (`TIOCSWINSZ` + `SIGWINCH`)
//! - Non-blocking master I/O for the event loop

pub mod error;
pub mod shell;
pub mod size;

pub use error::PtyError;
pub use shell::Shell;
pub use size::WindowSize;

pub type Result<T> = std::result::Result<T, PtyError>;
