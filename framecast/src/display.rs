//! Display seam and the bundled terminal status display

use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{cursor, execute, style};
use image::RgbImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayControl {
    Continue,
    Quit,
}

/// Shows received frames and reports whether the user asked to quit
pub trait Display {
    /// Present an annotated frame. `qr` is the decoded text, if any.
    fn show(&mut self, image: &RgbImage, qr: Option<&str>) -> io::Result<DisplayControl>;

    /// Non-blocking quit check for iterations where no frame arrived
    fn poll(&mut self) -> io::Result<DisplayControl>;
}

/// One-line live status in the terminal: frame count, size and the last
/// QR code seen. `q`, `Esc` or `Ctrl-C` quits.
///
/// Holds the terminal in raw mode for key polling and restores it on drop.
///
/// Pixels are not rendered: the outline and label [`QrScanner`] draws onto
/// each frame are discarded here. Implement [`Display`] over a window or
/// image sink to see them.
///
/// [`QrScanner`]: crate::QrScanner
pub struct TerminalDisplay {
    frames: u64,
    last_qr: Option<String>,
    _raw: RawModeGuard,
}

impl TerminalDisplay {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            frames: 0,
            last_qr: None,
            _raw: RawModeGuard::enable()?,
        })
    }

    fn render(&self, width: u32, height: u32) -> io::Result<()> {
        let qr = self.last_qr.as_deref().unwrap_or("-");
        let line = format!(
            "frame {:>6} | {}x{} | last QR: {} | press q to quit",
            self.frames, width, height, qr
        );
        let mut out = io::stdout();
        execute!(
            out,
            cursor::MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            style::Print(line)
        )?;
        out.flush()
    }
}

impl Display for TerminalDisplay {
    fn show(&mut self, image: &RgbImage, qr: Option<&str>) -> io::Result<DisplayControl> {
        self.frames += 1;
        if let Some(text) = qr {
            self.last_qr = Some(text.to_string());
        }
        self.render(image.width(), image.height())?;
        self.poll()
    }

    fn poll(&mut self) -> io::Result<DisplayControl> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if is_quit_key(&key) {
                    return Ok(DisplayControl::Quit);
                }
            }
        }
        Ok(DisplayControl::Continue)
    }
}

fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Raw mode for the lifetime of the guard
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // Always attempt to restore terminal state, ignoring errors
        let _ = terminal::disable_raw_mode();
        let _ = execute!(io::stdout(), style::Print("\r\n"));
    }
}
