//! Frame acquisition trait and the stereo split.
//!
//! The owl's cameras arrive as one combined image with the two eyes side by
//! side, mirrored.  [`split_stereo`] undoes the mirroring and cuts the pair
//! into fixed-size left and right rasters.

use std::time::Duration;

use owl_types::OwlError;
use serde::{Deserialize, Serialize};

/// An RGB24 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row-major RGB24 pixel data, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl RasterFrame {
    /// Wrap raw RGB24 data.
    ///
    /// # Errors
    ///
    /// Returns [`OwlError::FrameGeometry`] if `data` does not hold exactly
    /// `width * height` pixels.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, OwlError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(OwlError::FrameGeometry(format!(
                "{width}x{height} RGB frame needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// An all-black frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    /// RGB value at `(x, y)`.  Panics if the coordinate is outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Overwrite the pixel at `(x, y)`; coordinates outside the frame are
    /// ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x < self.width && y < self.height {
            let i = self.offset(x, y);
            self.data[i..i + 3].copy_from_slice(&rgb);
        }
    }
}

/// One left/right pair of eye images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StereoFrame {
    pub left: RasterFrame,
    pub right: RasterFrame,
}

/// Size of each eye's region within the combined frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoGeometry {
    pub eye_width: u32,
    pub eye_height: u32,
    /// Mirror the combined frame before splitting (the owl stream arrives
    /// reversed).
    pub flip_horizontal: bool,
}

impl Default for StereoGeometry {
    fn default() -> Self {
        Self {
            eye_width: 640,
            eye_height: 480,
            flip_horizontal: true,
        }
    }
}

/// Split a combined side-by-side frame into its left and right eye images.
///
/// When `flip_horizontal` is set the combined frame is mirrored first; the
/// left eye is then columns `[0, eye_width)` and the right eye columns
/// `[eye_width, 2 * eye_width)`, both cropped to the first `eye_height` rows.
///
/// # Errors
///
/// Returns [`OwlError::FrameGeometry`] if the frame is smaller than
/// `2 * eye_width` by `eye_height`.
pub fn split_stereo(frame: &RasterFrame, geometry: &StereoGeometry) -> Result<StereoFrame, OwlError> {
    let (w, h) = (geometry.eye_width, geometry.eye_height);
    if w == 0 || h == 0 || frame.width < 2 * w || frame.height < h {
        return Err(OwlError::FrameGeometry(format!(
            "{}x{} frame cannot hold two {w}x{h} eye images",
            frame.width, frame.height
        )));
    }

    let mut left = RasterFrame::blank(w, h);
    let mut right = RasterFrame::blank(w, h);
    let row_bytes = w as usize * 3;

    for y in 0..h {
        if geometry.flip_horizontal {
            for x in 0..w {
                left.put_pixel(x, y, frame.pixel(frame.width - 1 - x, y));
                right.put_pixel(x, y, frame.pixel(frame.width - 1 - (w + x), y));
            }
        } else {
            let src = frame.offset(0, y);
            let dst = left.offset(0, y);
            left.data[dst..dst + row_bytes].copy_from_slice(&frame.data[src..src + row_bytes]);
            let src = frame.offset(w, y);
            right.data[dst..dst + row_bytes].copy_from_slice(&frame.data[src..src + row_bytes]);
        }
    }

    Ok(StereoFrame { left, right })
}

/// Result of one bounded-wait acquisition.
#[derive(Debug, Clone)]
pub enum Acquisition {
    Frame(StereoFrame),
    /// No frame arrived within the wait budget.  Transient: the caller may
    /// carry on with the tick.
    Stalled,
}

/// A video source that yields stereo pairs.
pub trait FrameSource: Send {
    /// Identifier of the stream, used in logs and errors.
    fn source_url(&self) -> &str;

    /// Wait at most `timeout` for the next stereo pair.
    ///
    /// # Errors
    ///
    /// Returns [`OwlError::SourceUnavailable`] when the stream is gone for
    /// good (closed, unreachable, or delivering unusable frames).
    fn acquire(&mut self, timeout: Duration) -> Result<Acquisition, OwlError>;
}
