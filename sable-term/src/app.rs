//! The application: window, event loop, and shell I/O multiplexing.
//!
//! The window system delivers its events through winit; the PTY is serviced
//! between them with a readiness waiter, so one thread interleaves display
//! events, shell reads, queued writes, and throttled redraws. Back-pressure
//! is honoured in both directions: writes stop at the first would-block and
//! reads stop when the shell has nothing more to say.

use std::io::{self, Read, Write};
use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use arboard::Clipboard;
use log::{debug, error, info, warn};
use polling::{Event, Events, Poller};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event as WinitEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key as WinitKey, ModifiersState, NamedKey};
use winit::window::{Window, WindowBuilder};

use sable_core::Size;
use sable_pty::{Shell, WindowSize};

use crate::config::Config;
use crate::font::FontCache;
use crate::input::{self, Key, Modifiers, Shortcut};
use crate::renderer::Renderer;
use crate::terminal::Terminal;

/// Poller key for the PTY master.
const PTY_KEY: usize = 0;

/// How long the waiter sleeps when there is nothing to redraw.
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Smallest and largest shell read buffer.
const MIN_READ: usize = 4096;
const MAX_READ: usize = 4 * 1024 * 1024;

/// Font size step for the zoom shortcuts.
const FONT_STEP: f32 = 1.1;

/// Defers redraws while the shell floods the terminal.
///
/// More than ten consecutive waiter rounds finishing in under a millisecond
/// means output is arriving faster than it can be usefully drawn; redraws
/// are then held to one per interval instead of one per round.
struct RedrawLimiter {
    min_interval: Duration,
    fast_threshold: Duration,
    fast_waits: u32,
    last_redraw: Instant,
}

impl RedrawLimiter {
    fn new(now: Instant) -> Self {
        RedrawLimiter {
            min_interval: Duration::from_millis(40),
            fast_threshold: Duration::from_millis(1),
            fast_waits: 0,
            last_redraw: now,
        }
    }

    fn note_wait(&mut self, waited: Duration) {
        if waited < self.fast_threshold {
            self.fast_waits = self.fast_waits.saturating_add(1);
        } else {
            self.fast_waits = 0;
        }
    }

    fn high_frequency(&self) -> bool {
        self.fast_waits > 10
    }

    fn should_redraw(&self, now: Instant) -> bool {
        !self.high_frequency() || now.duration_since(self.last_redraw) >= self.min_interval
    }

    /// How long the waiter may block before the next permitted redraw.
    fn wait_budget(&self, now: Instant) -> Duration {
        if self.should_redraw(now) {
            Duration::ZERO
        } else {
            self.min_interval
                .saturating_sub(now.duration_since(self.last_redraw))
        }
    }

    fn note_redraw(&mut self, now: Instant) {
        self.last_redraw = now;
    }
}

pub struct App {
    config: Config,
    window: Option<Rc<Window>>,
    renderer: Option<Renderer>,
    fonts: Option<FontCache>,
    terminal: Option<Terminal>,
    shell: Option<Shell>,
    shell_fd: RawFd,
    poller: Option<Poller>,
    events: Events,
    clipboard: Option<Clipboard>,
    modifiers: ModifiersState,
    title: String,
    /// Coalesced resize; applied at most once per loop iteration.
    pending_resize: Option<PhysicalSize<u32>>,
    read_buf: Vec<u8>,
    largest_read: usize,
    limiter: RedrawLimiter,
    font_px: f32,
}

impl App {
    pub fn new(config: Config) -> Self {
        App {
            config,
            window: None,
            renderer: None,
            fonts: None,
            terminal: None,
            shell: None,
            shell_fd: -1,
            poller: None,
            events: Events::new(),
            clipboard: Clipboard::new().ok(),
            modifiers: ModifiersState::empty(),
            title: String::new(),
            pending_resize: None,
            read_buf: vec![0; MIN_READ],
            largest_read: 0,
            limiter: RedrawLimiter::new(Instant::now()),
            font_px: 0.0,
        }
    }

    pub fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let event_loop = EventLoop::new()?;
        let window = Rc::new(
            WindowBuilder::new()
                .with_title("sable")
                .with_inner_size(LogicalSize::new(800.0, 600.0))
                .build(&event_loop)?,
        );

        self.init(window)?;

        event_loop.run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            match event {
                WinitEvent::WindowEvent { event, .. } => {
                    self.handle_window_event(event, elwt);
                }
                WinitEvent::AboutToWait => {
                    self.service_shell(elwt);
                }
                _ => {}
            }
        })?;
        Ok(())
    }

    fn init(&mut self, window: Rc<Window>) -> Result<(), Box<dyn std::error::Error>> {
        self.font_px = self.config.font_size * window.scale_factor() as f32;
        let fonts = FontCache::new(&self.config.font_family, self.font_px)?;
        let renderer = Renderer::new(window.clone())?;

        let size = window.inner_size();
        let metrics = fonts.metrics();
        let cols = (size.width as usize / metrics.cell_width).max(1);
        let rows = (size.height as usize / metrics.cell_height).max(1);

        let terminal = Terminal::new(Size::new(cols, rows, self.config.scrollback_rows));
        let shell = Shell::spawn(
            self.config.shell.as_deref(),
            WindowSize::with_pixels(cols as u16, rows as u16, size.width as u16,
                size.height as u16),
        )?;
        shell.set_nonblocking(true)?;

        let poller = Poller::new()?;
        self.shell_fd = shell.master_fd();
        // SAFETY: the fd stays registered for exactly as long as the shell
        // lives; both are owned by the App.
        unsafe {
            poller.add(self.shell_fd, Event::readable(PTY_KEY))?;
        }

        info!("terminal {}x{} cells", cols, rows);
        self.window = Some(window);
        self.renderer = Some(renderer);
        self.fonts = Some(fonts);
        self.terminal = Some(terminal);
        self.shell = Some(shell);
        self.poller = Some(poller);
        Ok(())
    }

    fn handle_window_event(&mut self, event: WindowEvent, elwt: &EventLoopWindowTarget<()>) {
        match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::Resized(size) => {
                self.pending_resize = Some(size);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    self.handle_key(&event.logical_key, elwt);
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.set_font_px(self.config.font_size * scale_factor as f32);
            }
            WindowEvent::RedrawRequested => self.render(),
            _ => {}
        }
    }

    fn handle_key(&mut self, key: &WinitKey, elwt: &EventLoopWindowTarget<()>) {
        let Some(key) = translate_key(key) else {
            return;
        };
        let mods = Modifiers {
            shift: self.modifiers.shift_key(),
            ctrl: self.modifiers.control_key(),
            alt: self.modifiers.alt_key(),
        };

        if let Some(action) = input::shortcut(key, mods) {
            match action {
                Shortcut::CloseWindow => elwt.exit(),
                Shortcut::FontSmaller => self.set_font_px(self.font_px / FONT_STEP),
                Shortcut::FontLarger => self.set_font_px(self.font_px * FONT_STEP),
                Shortcut::Paste => self.paste_clipboard(),
            }
            return;
        }

        let bytes = input::encode_key(key, mods);
        if let Some(terminal) = self.terminal.as_mut() {
            terminal.input_bytes(&bytes);
        }
    }

    fn paste_clipboard(&mut self) {
        let Some(clipboard) = self.clipboard.as_mut() else {
            warn!("clipboard unavailable");
            return;
        };
        match clipboard.get_text() {
            Ok(text) => {
                if let Some(terminal) = self.terminal.as_mut() {
                    terminal.paste(&text);
                }
            }
            Err(e) => debug!("clipboard read failed: {}", e),
        }
    }

    fn set_font_px(&mut self, px: f32) {
        let Some(fonts) = self.fonts.as_mut() else {
            return;
        };
        self.font_px = px.clamp(4.0, 256.0);
        fonts.set_size(self.font_px);
        // Cell geometry changed: refit the grid to the window.
        if let Some(window) = &self.window {
            self.pending_resize = Some(window.inner_size());
        }
        if let Some(terminal) = self.terminal.as_mut() {
            terminal.mark_dirty();
        }
    }

    /// Apply a coalesced resize: new grid, one reflow, PTY informed.
    fn apply_resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        let (Some(renderer), Some(fonts), Some(terminal), Some(shell)) = (
            self.renderer.as_mut(),
            self.fonts.as_ref(),
            self.terminal.as_mut(),
            self.shell.as_ref(),
        ) else {
            return;
        };

        renderer.resize(size.width, size.height);
        let metrics = fonts.metrics();
        let cols = (size.width as usize / metrics.cell_width).max(1);
        let rows = (size.height as usize / metrics.cell_height).max(1);

        let grid = terminal.grid().size();
        if (grid.cols, grid.rows) != (cols, rows) {
            terminal.resize(cols, rows);
            if let Err(e) = shell.resize(WindowSize::with_pixels(
                cols as u16,
                rows as u16,
                size.width as u16,
                size.height as u16,
            )) {
                warn!("PTY resize failed: {}", e);
            }
        }
        terminal.mark_dirty();
    }

    /// One round of PTY service: writes, the waiter, reads, redraw policy.
    fn service_shell(&mut self, elwt: &EventLoopWindowTarget<()>) {
        if let Some(size) = self.pending_resize.take() {
            self.apply_resize(size);
        }

        if self.flush_writes().is_err() {
            elwt.exit();
            return;
        }

        self.wait_for_shell();

        match self.drain_shell() {
            Ok(()) => {}
            Err(_) => {
                info!("shell hangup");
                elwt.exit();
                return;
            }
        }

        if let Some(shell) = &self.shell {
            if let Some(code) = shell.try_wait() {
                info!("shell exited with status {}", code);
                elwt.exit();
                return;
            }
        }

        self.sync_title();

        let (Some(terminal), Some(window)) = (self.terminal.as_ref(), self.window.as_ref())
        else {
            return;
        };
        if terminal.is_dirty() && self.limiter.should_redraw(Instant::now()) {
            window.request_redraw();
        }
    }

    /// Drain the outbound queue until empty, short write, or would-block.
    fn flush_writes(&mut self) -> io::Result<()> {
        let (Some(terminal), Some(shell)) = (self.terminal.as_mut(), self.shell.as_mut()) else {
            return Ok(());
        };
        while !terminal.output().is_empty() {
            let (head, _) = terminal.output().as_slices();
            match shell.write(head) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    let short = n < head.len();
                    terminal.take_output(n);
                    if short {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("PTY write failed: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Block briefly on the PTY: readability always, writability only while
    /// bytes are queued. Display events were already drained by winit, so
    /// only the redraw deadline bounds the wait.
    fn wait_for_shell(&mut self) {
        let (Some(terminal), Some(poller)) = (self.terminal.as_ref(), self.poller.as_ref())
        else {
            return;
        };

        let now = Instant::now();
        let timeout = if terminal.is_dirty() {
            self.limiter.wait_budget(now)
        } else {
            IDLE_WAIT
        };

        let interest = if terminal.output().is_empty() {
            Event::readable(PTY_KEY)
        } else {
            Event::all(PTY_KEY)
        };
        // SAFETY: shell_fd is open for the lifetime of the registration.
        let fd = unsafe { BorrowedFd::borrow_raw(self.shell_fd) };
        if let Err(e) = poller.modify(fd, interest) {
            debug!("poller modify failed: {}", e);
        }

        self.events.clear();
        let started = Instant::now();
        if let Err(e) = poller.wait(&mut self.events, Some(timeout)) {
            if e.kind() != io::ErrorKind::Interrupted {
                warn!("poller wait failed: {}", e);
            }
        }
        self.limiter.note_wait(started.elapsed());
    }

    /// Read everything the shell has, growing the buffer adaptively.
    /// An `Err` return means hangup.
    fn drain_shell(&mut self) -> io::Result<()> {
        let (Some(terminal), Some(shell)) = (self.terminal.as_mut(), self.shell.as_mut()) else {
            return Ok(());
        };

        let target = (self.largest_read * 2).clamp(MIN_READ, MAX_READ);
        if self.read_buf.len() != target {
            self.read_buf.resize(target, 0);
        }

        loop {
            match shell.read(&mut self.read_buf) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    self.largest_read = self.largest_read.max(n);
                    terminal.process_bytes(&self.read_buf[..n]);
                    if n < self.read_buf.len() {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // EIO is how Linux reports a vanished PTY peer.
                Err(e) => return Err(e),
            }
        }
    }

    fn sync_title(&mut self) {
        let (Some(terminal), Some(window)) = (self.terminal.as_ref(), self.window.as_ref())
        else {
            return;
        };
        if terminal.title != self.title && !terminal.title.is_empty() {
            self.title = terminal.title.clone();
            window.set_title(&self.title);
        }
    }

    fn render(&mut self) {
        let (Some(renderer), Some(terminal), Some(fonts)) = (
            self.renderer.as_mut(),
            self.terminal.as_mut(),
            self.fonts.as_mut(),
        ) else {
            return;
        };
        match renderer.render(terminal.grid(), fonts) {
            Ok(()) => {
                terminal.mark_clean();
                self.limiter.note_redraw(Instant::now());
            }
            // A failed frame is skipped, not fatal; the next redraw retries.
            Err(e) => warn!("frame skipped: {}", e),
        }
    }
}

fn translate_key(key: &WinitKey) -> Option<Key> {
    match key {
        WinitKey::Named(named) => match named {
            NamedKey::Enter => Some(Key::Enter),
            NamedKey::Tab => Some(Key::Tab),
            NamedKey::Backspace => Some(Key::Backspace),
            NamedKey::Escape => Some(Key::Escape),
            NamedKey::ArrowUp => Some(Key::Up),
            NamedKey::ArrowDown => Some(Key::Down),
            NamedKey::ArrowLeft => Some(Key::Left),
            NamedKey::ArrowRight => Some(Key::Right),
            NamedKey::Home => Some(Key::Home),
            NamedKey::End => Some(Key::End),
            NamedKey::PageUp => Some(Key::PageUp),
            NamedKey::PageDown => Some(Key::PageDown),
            NamedKey::Insert => Some(Key::Insert),
            NamedKey::Delete => Some(Key::Delete),
            NamedKey::Space => Some(Key::Char(' ')),
            _ => None,
        },
        WinitKey::Character(s) => s.chars().next().map(Key::Char),
        _ => None,
    }
}
