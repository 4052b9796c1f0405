//! Colour tracking ("chameleon" eyes).
//!
//! Each eye follows the target seen in its own image, independently of the
//! other.  The correction is proportional to the pixel error from the image
//! centre, limited to `max_step` servo units per tick.  An eye with no
//! observation holds its position.

use owl_types::{Axis, AxisState, ImagePoint, TargetObservation};
use serde::{Deserialize, Serialize};

use super::{Generator, Progress, tilt_up_sign};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackSettings {
    /// Servo units per pixel of error.
    pub gain: f32,
    /// Largest correction applied per tick on any axis.
    pub max_step: i32,
    /// Pixel errors smaller than this are treated as on target.
    pub deadband_px: f32,
    /// Image size the observations refer to; its centre is the aim point.
    pub image_width: u32,
    pub image_height: u32,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            gain: 0.15,
            max_step: 15,
            deadband_px: 8.0,
            image_width: 640,
            image_height: 480,
        }
    }
}

/// Proportional per-eye tracker.
#[derive(Debug, Clone)]
pub struct ColorTrack {
    settings: TrackSettings,
}

impl ColorTrack {
    pub fn new(settings: TrackSettings) -> Self {
        Self { settings }
    }

    fn correction(&self, error_px: f32) -> i32 {
        if error_px.abs() < self.settings.deadband_px {
            return 0;
        }
        let step = self.settings.max_step.saturating_abs();
        ((self.settings.gain * error_px).round() as i32).clamp(-step, step)
    }

    fn steer(&self, axes: &mut AxisState, pan: Axis, tilt: Axis, seen: ImagePoint) {
        let cx = self.settings.image_width as f32 / 2.0;
        let cy = self.settings.image_height as f32 / 2.0;
        // Target right of centre: pan right.  Target above centre (smaller
        // y): tilt up.
        axes.nudge(pan, self.correction(seen.x - cx));
        axes.nudge(tilt, tilt_up_sign(tilt) * self.correction(cy - seen.y));
    }
}

impl Generator for ColorTrack {
    fn step(&mut self, axes: &mut AxisState, target: Option<&TargetObservation>) -> Progress {
        let Some(obs) = target else {
            return Progress::Running;
        };
        if let Some(p) = obs.right {
            self.steer(axes, Axis::RightPan, Axis::RightTilt, p);
        }
        if let Some(p) = obs.left {
            self.steer(axes, Axis::LeftPan, Axis::LeftTilt, p);
        }
        Progress::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use owl_types::AxisLimits;

    fn axes() -> AxisState {
        AxisState::new(AxisLimits::default()).unwrap()
    }

    fn both(x: f32, y: f32) -> TargetObservation {
        TargetObservation {
            right: Some(ImagePoint::new(x, y)),
            left: Some(ImagePoint::new(x, y)),
        }
    }

    #[test]
    fn no_observation_holds_position_for_many_ticks() {
        let mut a = axes();
        a.nudge(Axis::RightPan, 30);
        let before = a.clone();
        let mut track = ColorTrack::new(TrackSettings::default());
        for _ in 0..50 {
            track.step(&mut a, None);
            track.step(&mut a, Some(&TargetObservation::none()));
        }
        assert_eq!(a, before);
    }

    #[test]
    fn target_up_right_moves_both_eyes_up_right() {
        let mut a = axes();
        let start = a.clone();
        let mut track = ColorTrack::new(TrackSettings::default());
        // 60 px right, 40 px up of centre (320, 240).
        track.step(&mut a, Some(&both(380.0, 200.0)));
        assert_eq!(a.right_pan() - start.right_pan(), 9);
        assert_eq!(a.left_pan() - start.left_pan(), 9);
        assert_eq!(a.right_tilt() - start.right_tilt(), 6);
        assert_eq!(a.left_tilt() - start.left_tilt(), -6);
        assert_eq!(a.neck_pan(), start.neck_pan());
    }

    #[test]
    fn correction_is_limited_per_tick() {
        let mut a = axes();
        let start = a.clone();
        let mut track = ColorTrack::new(TrackSettings::default());
        track.step(&mut a, Some(&both(0.0, 480.0)));
        assert_eq!(a.right_pan() - start.right_pan(), -15);
        assert_eq!(a.right_tilt() - start.right_tilt(), -15);
        assert_eq!(a.left_tilt() - start.left_tilt(), 15);
    }

    #[test]
    fn deadband_ignores_small_errors() {
        let mut a = axes();
        let before = a.clone();
        let mut track = ColorTrack::new(TrackSettings::default());
        track.step(&mut a, Some(&both(325.0, 236.0)));
        assert_eq!(a, before);
    }

    #[test]
    fn eyes_track_independently() {
        let mut a = axes();
        let start = a.clone();
        let mut track = ColorTrack::new(TrackSettings::default());
        let obs = TargetObservation {
            right: Some(ImagePoint::new(400.0, 240.0)),
            left: None,
        };
        track.step(&mut a, Some(&obs));
        assert_eq!(a.right_pan() - start.right_pan(), 12);
        assert_eq!(a.left_pan(), start.left_pan());
        assert_eq!(a.left_tilt(), start.left_tilt());
    }

    #[test]
    fn persistent_target_never_overshoots_limits() {
        let mut a = axes();
        let mut track = ColorTrack::new(TrackSettings::default());
        for _ in 0..500 {
            track.step(&mut a, Some(&both(640.0, 0.0)));
        }
        assert_eq!(a.right_pan(), a.limits().right_pan.max);
        assert_eq!(a.right_tilt(), a.limits().right_tilt.max);
        assert_eq!(a.left_tilt(), a.limits().left_tilt.min);
    }

    #[test]
    fn extreme_gain_and_step_saturate() {
        let mut a = axes();
        let mut track = ColorTrack::new(TrackSettings {
            gain: 1e12,
            max_step: i32::MIN,
            ..TrackSettings::default()
        });
        track.step(&mut a, Some(&both(0.0, 0.0)));
        assert_eq!(a.right_pan(), a.limits().right_pan.min);
        assert_eq!(a.right_tilt(), a.limits().right_tilt.max);
        assert_eq!(a.left_tilt(), a.limits().left_tilt.min);
    }
}
