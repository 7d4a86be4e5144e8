//! QR detection seam and overlay drawing
//!
//! Detector backends do not agree on the shape of the corner points they
//! report: some return a flat list of points, others nest it one level
//! deeper. [`RawPoints`] captures both and [`Polygon::normalize`] turns
//! either into one ordered polygon before anything is drawn.

use std::panic::{self, AssertUnwindSafe};

use image::{GrayImage, Rgb, RgbImage};

/// Overlay colour and stroke width
const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const OUTLINE_THICKNESS: i32 = 3;
/// Label bar sits this far above the first corner
const LABEL_OFFSET: i32 = 10;
const LABEL_HEIGHT: i32 = 6;
const LABEL_CHAR_WIDTH: i32 = 8;

/// Corner points as a backend reported them
#[derive(Debug, Clone, PartialEq)]
pub enum RawPoints {
    Flat(Vec<[f32; 2]>),
    Nested(Vec<Vec<[f32; 2]>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub text: String,
    pub points: RawPoints,
}

#[derive(Debug, thiserror::Error)]
#[error("QR detection failed: {0}")]
pub struct DetectError(pub String);

/// Locates and decodes QR codes in a greyscale image
pub trait Detector {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Detection>, DetectError>;
}

/// Ordered, closed polygon in integer pixel coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    points: Vec<(i32, i32)>,
}

impl Polygon {
    /// Accepts either point shape. For nested input the first non-empty
    /// group is used. Coordinates are truncated toward zero. Empty input or
    /// non-finite coordinates yield `None`.
    pub fn normalize(raw: RawPoints) -> Option<Self> {
        let flat = match raw {
            RawPoints::Flat(points) => points,
            RawPoints::Nested(groups) => groups.into_iter().find(|g| !g.is_empty())?,
        };
        if flat.is_empty() || flat.iter().flatten().any(|c| !c.is_finite()) {
            return None;
        }
        Some(Self {
            points: flat.iter().map(|[x, y]| (*x as i32, *y as i32)).collect(),
        })
    }

    pub fn points(&self) -> &[(i32, i32)] {
        &self.points
    }

    /// Pull every point into `[-w, 2w] x [-h, 2h]` of a `w` x `h` image.
    ///
    /// Drawing cost follows edge length, so corners far off-screen would
    /// otherwise walk billions of clipped pixels.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let w = i32::try_from(width).unwrap_or(i32::MAX / 2);
        let h = i32::try_from(height).unwrap_or(i32::MAX / 2);
        Self {
            points: self
                .points
                .iter()
                .map(|&(x, y)| (x.clamp(-w, w.saturating_mul(2)), y.clamp(-h, h.saturating_mul(2))))
                .collect(),
        }
    }

    /// Edges in order, including the closing edge back to the first point
    pub fn edges(&self) -> impl Iterator<Item = ((i32, i32), (i32, i32))> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }
}

/// Runs a detector over frames and draws what it finds.
pub struct QrScanner<D> {
    detector: D,
}

impl<D: Detector> QrScanner<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    /// Scan `image`, outline every decoded code in place, and return the
    /// first decoded text.
    ///
    /// Detector errors and panics count as "no code found". The image
    /// keeps its dimensions.
    pub fn process(&mut self, image: &mut RgbImage) -> Option<String> {
        let gray = image::DynamicImage::ImageRgb8(image.clone()).into_luma8();
        let detector = &mut self.detector;

        let detections = match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&gray))) {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                log::warn!("QR Scan Error: {e}");
                return None;
            }
            Err(_) => {
                log::warn!("QR Scan Error: detector panicked");
                return None;
            }
        };

        let mut first = None;
        for detection in detections.into_iter().filter(|d| !d.text.is_empty()) {
            if let Some(polygon) = Polygon::normalize(detection.points) {
                let polygon = polygon.clamped(image.width(), image.height());
                draw_outline(image, &polygon);
                draw_label(image, &polygon, &detection.text);
            }
            first.get_or_insert(detection.text);
        }
        first
    }
}

/// Pure-Rust backend built on `rqrr`
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDetector;

impl Detector for RqrrDetector {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Detection>, DetectError> {
        let (w, h) = image.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
                image.get_pixel(x as u32, y as u32).0[0]
            });

        let mut found = Vec::new();
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_meta, text)) => found.push(Detection {
                    text,
                    points: RawPoints::Flat(
                        grid.bounds.iter().map(|p| [p.x as f32, p.y as f32]).collect(),
                    ),
                }),
                Err(e) => log::debug!("QR grid found but not decoded: {e:?}"),
            }
        }
        Ok(found)
    }
}

fn draw_outline(image: &mut RgbImage, polygon: &Polygon) {
    for (from, to) in polygon.edges() {
        draw_line(image, from, to, OUTLINE, OUTLINE_THICKNESS);
    }
}

/// Placeholder for the decoded text: no font is bundled, so this fills a
/// solid bar as wide as the text would be, above the first corner. The text
/// itself is only returned and logged.
fn draw_label(image: &mut RgbImage, polygon: &Polygon, text: &str) {
    let Some(&(x, y)) = polygon.points().first() else {
        return;
    };
    let chars = i32::try_from(text.chars().count()).unwrap_or(i32::MAX);
    let right = x
        .saturating_add(chars.saturating_mul(LABEL_CHAR_WIDTH))
        .min(i32::try_from(image.width()).unwrap_or(i32::MAX));
    let top = y.saturating_sub(LABEL_OFFSET + LABEL_HEIGHT);
    for py in top..top.saturating_add(LABEL_HEIGHT) {
        for px in x.max(0)..right {
            put(image, px, py, OUTLINE);
        }
    }
}

/// Bresenham with a square brush; anything outside the image is clipped
fn draw_line(
    image: &mut RgbImage,
    from: (i32, i32),
    to: (i32, i32),
    color: Rgb<u8>,
    thickness: i32,
) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    let lo = -(thickness / 2);
    let hi = lo + thickness;

    loop {
        for by in lo..hi {
            for bx in lo..hi {
                put(image, x + bx, y + by, color);
            }
        }
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}
