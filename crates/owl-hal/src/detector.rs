//! Target detection for the tracking behavior.
//!
//! [`ColorBlobDetector`] finds the centroid of pixels whose HSV colour
//! falls inside a configured window.  It samples every `stride`-th pixel in
//! both directions, which is plenty for steering an eye and keeps the
//! per-tick cost small at 640x480.

use owl_types::{ImagePoint, TargetObservation};
use serde::{Deserialize, Serialize};

use crate::camera::{RasterFrame, StereoFrame};

/// Locates a target in one eye's image.
pub trait TargetDetector: Send {
    /// Return the target's position in `image`, or `None` if not found.
    fn locate(&mut self, image: &RasterFrame) -> Option<ImagePoint>;

    /// Run [`locate`][Self::locate] on both eyes of a stereo pair.
    fn observe(&mut self, frame: &StereoFrame) -> TargetObservation {
        TargetObservation {
            right: self.locate(&frame.right),
            left: self.locate(&frame.left),
        }
    }
}

/// HSV window and sampling parameters for [`ColorBlobDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Lower hue bound in degrees `[0, 360)`.  When `hue_min > hue_max` the
    /// window wraps through 0 (useful for reds).
    pub hue_min: f32,
    /// Upper hue bound in degrees.
    pub hue_max: f32,
    /// Minimum saturation `[0, 1]`.
    pub saturation_min: f32,
    /// Minimum value (brightness) `[0, 1]`.
    pub value_min: f32,
    /// Fewer sampled matches than this means "not found".
    pub min_pixels: usize,
    /// Sample every `stride`-th pixel on each axis.
    pub stride: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            hue_min: 90.0,
            hue_max: 150.0,
            saturation_min: 0.45,
            value_min: 0.25,
            min_pixels: 12,
            stride: 4,
        }
    }
}

/// Convert an RGB24 pixel to `(hue_degrees, saturation, value)`.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue, saturation, max)
}

/// Centroid-of-colour detector.
#[derive(Debug, Clone, Default)]
pub struct ColorBlobDetector {
    settings: DetectorSettings,
}

impl ColorBlobDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }

    fn matches(&self, rgb: [u8; 3]) -> bool {
        let (h, s, v) = rgb_to_hsv(rgb);
        let s_ok = s >= self.settings.saturation_min && v >= self.settings.value_min;
        let (lo, hi) = (self.settings.hue_min, self.settings.hue_max);
        let h_ok = if lo <= hi {
            h >= lo && h <= hi
        } else {
            h >= lo || h <= hi
        };
        s_ok && h_ok
    }
}

impl TargetDetector for ColorBlobDetector {
    fn locate(&mut self, image: &RasterFrame) -> Option<ImagePoint> {
        let stride = self.settings.stride.max(1) as usize;
        let (mut sum_x, mut sum_y, mut count) = (0f64, 0f64, 0usize);
        for y in (0..image.height).step_by(stride) {
            for x in (0..image.width).step_by(stride) {
                if self.matches(image.pixel(x, y)) {
                    sum_x += x as f64;
                    sum_y += y as f64;
                    count += 1;
                }
            }
        }
        if count == 0 || count < self.settings.min_pixels {
            return None;
        }
        Some(ImagePoint::new(
            (sum_x / count as f64) as f32,
            (sum_y / count as f64) as f32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: [u8; 3] = [20, 220, 40];
    const RED: [u8; 3] = [230, 10, 20];

    fn frame_with_square(w: u32, h: u32, x0: u32, y0: u32, size: u32, rgb: [u8; 3]) -> RasterFrame {
        let mut f = RasterFrame::blank(w, h);
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                f.put_pixel(x, y, rgb);
            }
        }
        f
    }

    fn dense(settings: DetectorSettings) -> ColorBlobDetector {
        ColorBlobDetector::new(DetectorSettings {
            stride: 1,
            min_pixels: 4,
            ..settings
        })
    }

    #[test]
    fn hsv_of_primaries() {
        let (h, s, v) = rgb_to_hsv([255, 0, 0]);
        assert!(h.abs() < 1e-3 && (s - 1.0).abs() < 1e-6 && (v - 1.0).abs() < 1e-6);
        let (h, _, _) = rgb_to_hsv([0, 255, 0]);
        assert!((h - 120.0).abs() < 1e-3);
        let (h, _, _) = rgb_to_hsv([0, 0, 255]);
        assert!((h - 240.0).abs() < 1e-3);
        let (_, s, v) = rgb_to_hsv([0, 0, 0]);
        assert_eq!((s, v), (0.0, 0.0));
    }

    #[test]
    fn locates_centroid_of_green_square() {
        let frame = frame_with_square(40, 30, 10, 6, 5, GREEN);
        let p = dense(DetectorSettings::default()).locate(&frame).unwrap();
        assert!((p.x - 12.0).abs() < 1e-3);
        assert!((p.y - 8.0).abs() < 1e-3);
    }

    #[test]
    fn ignores_colours_outside_window() {
        let frame = frame_with_square(40, 30, 10, 6, 5, RED);
        assert!(dense(DetectorSettings::default()).locate(&frame).is_none());
    }

    #[test]
    fn wrapping_hue_window_finds_red() {
        let frame = frame_with_square(40, 30, 0, 0, 4, RED);
        let settings = DetectorSettings {
            hue_min: 340.0,
            hue_max: 20.0,
            ..DetectorSettings::default()
        };
        let p = dense(settings).locate(&frame).unwrap();
        assert!((p.x - 1.5).abs() < 1e-3);
    }

    #[test]
    fn too_few_pixels_is_not_found() {
        let frame = frame_with_square(40, 30, 10, 6, 1, GREEN);
        assert!(dense(DetectorSettings::default()).locate(&frame).is_none());
    }

    #[test]
    fn observe_reports_each_eye_independently() {
        let pair = StereoFrame {
            left: frame_with_square(40, 30, 2, 2, 4, GREEN),
            right: RasterFrame::blank(40, 30),
        };
        let obs = dense(DetectorSettings::default()).observe(&pair);
        assert!(obs.left.is_some());
        assert!(obs.right.is_none());
    }
}
