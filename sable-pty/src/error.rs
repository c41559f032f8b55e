//! Error types for PTY operations.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to open PTY master: {0}")]
    OpenMaster(#[source] nix::Error),

    #[error("failed to grant PTY access: {0}")]
    GrantPty(#[source] nix::Error),

    #[error("failed to unlock PTY: {0}")]
    UnlockPty(#[source] nix::Error),

    #[error("failed to resolve slave name: {0}")]
    SlaveName(#[source] nix::Error),

    #[error("failed to open slave PTY: {0}")]
    OpenSlave(#[source] nix::Error),

    #[error("failed to fork: {0}")]
    Fork(#[source] nix::Error),

    #[error("failed to set window size: {0}")]
    SetWindowSize(#[source] io::Error),

    #[error("failed to set non-blocking mode: {0}")]
    SetNonBlocking(#[source] io::Error),

    #[error("no shell found: set $SHELL")]
    NoShell,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
