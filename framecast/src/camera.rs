//! Camera seam and the bundled synthetic camera

use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use qrcodegen::{QrCode, QrCodeEcc};

use crate::Error;

/// Result of one capture attempt
#[derive(Debug)]
pub enum Capture {
    Frame(RgbImage),
    /// This frame could not be read; the stream keeps going
    Skip(String),
    /// The device has no more frames
    EndOfStream,
}

/// A frame source, opened once per session and released on drop
pub trait Camera {
    fn capture(&mut self) -> Capture;
}

/// Modules of white border around the rendered code
const QUIET_ZONE: i32 = 4;

/// Deterministic test-pattern camera.
///
/// Each frame is a light diagonal gradient that shifts with the frame
/// number, with a QR code in the middle carrying `framecast:<n>`. Frames are
/// paced to `interval`; a frame limit turns the device into a finite stream.
#[derive(Debug)]
pub struct PatternCamera {
    width: u32,
    height: u32,
    interval: Duration,
    limit: Option<u64>,
    next: u64,
    last_capture: Option<Instant>,
}

impl PatternCamera {
    /// Roughly 30 frames per second
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(33);

    pub fn open(width: u32, height: u32) -> crate::Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::CameraOpen(format!(
                "unsupported resolution {width}x{height}"
            )));
        }
        log::info!("Opened pattern camera ({width}x{height})");
        Ok(Self {
            width,
            height,
            interval: Self::DEFAULT_INTERVAL,
            limit: None,
            next: 0,
            last_capture: None,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Report end of stream after `frames` captures
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Text encoded in frame `n`
    pub fn payload_text(n: u64) -> String {
        format!("framecast:{n}")
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_capture {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last_capture = Some(Instant::now());
    }

    fn render(&self, n: u64) -> Result<RgbImage, String> {
        let code = QrCode::encode_text(&Self::payload_text(n), QrCodeEcc::Medium)
            .map_err(|e| format!("QR encode failed: {e:?}"))?;

        let modules = (code.size() + 2 * QUIET_ZONE) as u32;
        let scale = (self.width.min(self.height) * 3 / 5) / modules;
        let side = modules * scale;
        let ox = (self.width - side) / 2;
        let oy = (self.height - side) / 2;
        let shift = (n % 256) as u32;

        Ok(RgbImage::from_fn(self.width, self.height, |x, y| {
            // scale == 0 means the frame is too small for a code; side is 0 too
            if x >= ox && x < ox + side && y >= oy && y < oy + side {
                let mx = ((x - ox) / scale) as i32 - QUIET_ZONE;
                let my = ((y - oy) / scale) as i32 - QUIET_ZONE;
                // out-of-range modules read as light, which draws the quiet zone
                if code.get_module(mx, my) {
                    Rgb([0, 0, 0])
                } else {
                    Rgb([255, 255, 255])
                }
            } else {
                let v = ((x + y + shift) % 256) as u8;
                Rgb([160 + v / 4, 160 + v / 5, 200 + v / 6])
            }
        }))
    }
}

impl Camera for PatternCamera {
    fn capture(&mut self) -> Capture {
        if self.limit.is_some_and(|limit| self.next >= limit) {
            return Capture::EndOfStream;
        }
        self.pace();

        let n = self.next;
        self.next += 1;
        match self.render(n) {
            Ok(img) => Capture::Frame(img),
            Err(reason) => Capture::Skip(reason),
        }
    }
}
