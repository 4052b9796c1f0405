//! Raw-mode terminal keyboard.
//!
//! Raw mode delivers single key presses without Enter and turns Ctrl-C into
//! an ordinary key event, which is reported as [`Key::Interrupt`].  The
//! terminal is restored when the [`TerminalKeys`] is dropped.
//!
//! Raw mode also stops the terminal from turning `\n` into a carriage
//! return plus line feed, so log output goes through [`RawAwareStderr`].

use std::io::{self, Stderr, Write};
use std::time::{Duration, Instant};

use crossterm::cursor::MoveToColumn;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::queue;
use crossterm::terminal::{self, Clear, ClearType};
use owl_hal::KeySource;
use owl_types::Key;
use tracing::warn;
use tracing_subscriber::fmt::MakeWriter;

/// Raw-mode keyboard.  Only [`TerminalKeys::open`] should create one.
pub struct TerminalKeys;

impl TerminalKeys {
    /// Put the terminal into raw mode.
    pub fn open() -> Result<Self, String> {
        terminal::enable_raw_mode().map_err(|e| format!("cannot enable raw terminal mode: {e}"))?;
        Ok(Self)
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            eprintln!("[owl] failed to restore terminal: {e}");
        }
    }
}

impl KeySource for TerminalKeys {
    fn poll_key(&mut self, timeout: Duration) -> Option<Key> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match event::poll(remaining) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(k)) => {
                        if let Some(key) = map_key(k) {
                            return Some(key);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "keyboard read failed");
                        return None;
                    }
                },
                Ok(false) => return None,
                Err(e) => {
                    warn!(error = %e, "keyboard poll failed");
                    return None;
                }
            }
            if remaining.is_zero() {
                return None;
            }
        }
    }
}

/// Map a terminal key press onto an abstract [`Key`].  Releases, repeats of
/// non-character keys and unmapped codes yield `None`.
pub(crate) fn map_key(event: KeyEvent) -> Option<Key> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => Some(Key::Interrupt),
        KeyCode::Char(c) => Some(Key::Char(c.to_ascii_lowercase())),
        KeyCode::Esc => Some(Key::Escape),
        _ => None,
    }
}

/// Log writer for stderr.  While raw mode is on it clears the status line
/// before each record and ends lines with `\r\n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawAwareStderr;

impl<'a> MakeWriter<'a> for RawAwareStderr {
    type Writer = CrlfWriter<Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        CrlfWriter {
            inner: io::stderr(),
            raw: terminal::is_raw_mode_enabled().unwrap_or(false),
        }
    }
}

pub struct CrlfWriter<W: Write> {
    inner: W,
    raw: bool,
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.raw {
            return self.inner.write(buf);
        }
        queue!(self.inner, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        for line in buf.split_inclusive(|&b| b == b'\n') {
            match line.strip_suffix(b"\n") {
                Some(text) => {
                    self.inner.write_all(text)?;
                    self.inner.write_all(b"\r\n")?;
                }
                None => self.inner.write_all(line)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
