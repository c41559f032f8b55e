//! Window size propagation to the PTY.

use std::os::unix::io::RawFd;

/// Terminal dimensions in cells and pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl WindowSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        WindowSize {
            cols,
            rows,
            pixel_width: 0,
            pixel_height: 0,
        }
    }

    pub fn with_pixels(cols: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        WindowSize {
            cols,
            rows,
            pixel_width,
            pixel_height,
        }
    }

    fn to_winsize(self) -> libc::winsize {
        libc::winsize {
            ws_row: self.rows,
            ws_col: self.cols,
            ws_xpixel: self.pixel_width,
            ws_ypixel: self.pixel_height,
        }
    }

    fn from_winsize(ws: libc::winsize) -> Self {
        WindowSize {
            cols: ws.ws_col,
            rows: ws.ws_row,
            pixel_width: ws.ws_xpixel,
            pixel_height: ws.ws_ypixel,
        }
    }

    /// Apply this size to a PTY master.
    pub fn set_on_fd(self, fd: RawFd) -> std::io::Result<()> {
        let ws = self.to_winsize();
        // SAFETY: TIOCSWINSZ reads a valid winsize struct.
        if unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &ws) } == -1 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    /// Read the current size of a PTY master.
    pub fn get_from_fd(fd: RawFd) -> std::io::Result<Self> {
        // SAFETY: TIOCGWINSZ fills in a winsize struct.
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        if unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) } == -1 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(WindowSize::from_winsize(ws))
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        WindowSize::new(80, 24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winsize_round_trip() {
        let size = WindowSize::with_pixels(100, 30, 800, 600);
        let ws = size.to_winsize();
        assert_eq!(WindowSize::from_winsize(ws), size);
    }

    #[test]
    fn test_default_size() {
        let size = WindowSize::default();
        assert_eq!((size.cols, size.rows), (80, 24));
        assert_eq!((size.pixel_width, size.pixel_height), (0, 0));
    }
}
