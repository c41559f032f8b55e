//! Spawning the user's shell on a pseudo-terminal.
//!
//! Opens a PTY master with `posix_openpt`, forks, and in the child creates a
//! new session with the slave as the controlling terminal before exec'ing
//! the shell. The parent keeps the master as a `File` for RAII and switches
//! it to non-blocking for the event loop.

use std::env;
use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

use log::{debug, warn};
use nix::fcntl::{fcntl, open, FcntlArg, OFlag};
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{dup2, execvp, fork, setsid, ForkResult, Pid};

use crate::error::PtyError;
use crate::size::WindowSize;
use crate::Result;

/// A shell process attached to a PTY; the master side is `io`.
pub struct Shell {
    master: File,
    pid: Pid,
}

impl Shell {
    /// Spawn `$SHELL` (or the given override) on a fresh PTY of `size`.
    pub fn spawn(shell: Option<&str>, size: WindowSize) -> Result<Self> {
        let shell = match shell {
            Some(s) => s.to_string(),
            None => env::var("SHELL").map_err(|_| PtyError::NoShell)?,
        };
        let shell_c = CString::new(shell.as_str()).map_err(|_| PtyError::NoShell)?;

        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(PtyError::OpenMaster)?;
        grantpt(&master).map_err(PtyError::GrantPty)?;
        unlockpt(&master).map_err(PtyError::UnlockPty)?;
        let slave_path = ptsname_r(&master).map_err(PtyError::SlaveName)?;

        size.set_on_fd(master.as_raw_fd())
            .map_err(PtyError::SetWindowSize)?;

        // SAFETY: the child only calls async-signal-safe functions before
        // exec (setsid, open, ioctl, dup2, execvp).
        match unsafe { fork() }.map_err(PtyError::Fork)? {
            ForkResult::Child => {
                drop_master_and_exec(master, &slave_path, &shell_c);
            }
            ForkResult::Parent { child } => {
                debug!("spawned {} as pid {}", shell, child);
                // SAFETY: we own the master fd; File takes over the RAII.
                let master = unsafe { File::from_raw_fd(master.into_raw_fd()) };
                Ok(Shell { master, pid: child })
            }
        }
    }

    pub fn master_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Switch the master to non-blocking mode for event-loop use.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        let fd = self.master_fd();
        let flags = fcntl(fd, FcntlArg::F_GETFL)
            .map_err(|e| PtyError::SetNonBlocking(io::Error::from(e)))?;
        let mut flags = OFlag::from_bits_truncate(flags);
        flags.set(OFlag::O_NONBLOCK, nonblocking);
        fcntl(fd, FcntlArg::F_SETFL(flags))
            .map_err(|e| PtyError::SetNonBlocking(io::Error::from(e)))?;
        Ok(())
    }

    /// Propagate a new window size and nudge the child with SIGWINCH.
    pub fn resize(&self, size: WindowSize) -> Result<()> {
        size.set_on_fd(self.master_fd())
            .map_err(PtyError::SetWindowSize)?;
        if let Err(e) = kill(self.pid, Signal::SIGWINCH) {
            warn!("SIGWINCH to {} failed: {}", self.pid, e);
        }
        Ok(())
    }

    /// Non-blocking check whether the child has exited.
    pub fn try_wait(&self) -> Option<i32> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => Some(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => Some(128 + sig as i32),
            Ok(_) => None,
            // Already reaped.
            Err(nix::errno::Errno::ECHILD) => Some(0),
            Err(_) => None,
        }
    }
}

impl Read for Shell {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.master.read(buf)
    }
}

impl Write for Shell {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.master.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.master.flush()
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        // Reap if already dead so we don't leave a zombie.
        let _ = self.try_wait();
    }
}

/// Child-side setup after fork; never returns.
fn drop_master_and_exec(
    master: nix::pty::PtyMaster,
    slave_path: &str,
    shell: &CString,
) -> ! {
    drop(master);

    if setsid().is_err() {
        std::process::exit(1);
    }

    let slave_fd = match open(slave_path, OFlag::O_RDWR, Mode::empty()) {
        Ok(fd) => fd,
        Err(_) => std::process::exit(1),
    };

    // SAFETY: TIOCSCTTY on the freshly opened slave of our new session.
    unsafe {
        if libc::ioctl(slave_fd, libc::TIOCSCTTY, 0) < 0 {
            // Non-fatal on some systems; the session setup usually suffices.
        }
    }

    if dup2(slave_fd, libc::STDIN_FILENO).is_err()
        || dup2(slave_fd, libc::STDOUT_FILENO).is_err()
        || dup2(slave_fd, libc::STDERR_FILENO).is_err()
    {
        std::process::exit(1);
    }
    if slave_fd > libc::STDERR_FILENO {
        let _ = nix::unistd::close(slave_fd);
    }

    env::set_var("TERM", "xterm-256color");
    env::set_var("COLORTERM", "truecolor");

    let argv = [shell.clone()];
    let _ = execvp(shell, &argv);

    // execvp only returns on error.
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_spawn_echo_and_read() {
        let mut shell =
            Shell::spawn(Some("/bin/sh"), WindowSize::new(80, 24)).expect("spawn shell");
        shell.set_nonblocking(true).expect("nonblocking");

        shell.write_all(b"echo pty-ok; exit\n").expect("write");

        let mut collected = Vec::new();
        let mut buf = [0u8; 4096];
        for _ in 0..50 {
            std::thread::sleep(Duration::from_millis(20));
            match shell.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                // EIO signals hangup on Linux PTYs.
                Err(_) => break,
            }
            if String::from_utf8_lossy(&collected).contains("pty-ok") {
                break;
            }
        }
        assert!(String::from_utf8_lossy(&collected).contains("pty-ok"));
    }

    #[test]
    fn test_resize_round_trip() {
        let shell = Shell::spawn(Some("/bin/sh"), WindowSize::new(80, 24)).expect("spawn shell");
        shell
            .resize(WindowSize::with_pixels(100, 30, 900, 600))
            .expect("resize");
        let size = WindowSize::get_from_fd(shell.master_fd()).expect("get size");
        assert_eq!((size.cols, size.rows), (100, 30));
    }
}
