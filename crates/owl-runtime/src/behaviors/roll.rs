//! Canned eye-roll animations.
//!
//! An animation is a closed list of [`Keyframe`]s, each held for a fixed
//! number of ticks.  Offsets are applied to the pose captured on the first
//! step after entry (the anchor), and the final keyframe is always the zero
//! offset, so one full pass returns every driven axis exactly to where it
//! started.  The animation then wraps and plays again.

use owl_types::{Axis, AxisState, TargetObservation};
use serde::{Deserialize, Serialize};

use super::{Generator, Progress, tilt_up_sign};

/// One pose of an animation, as offsets from the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyframe {
    /// Eye pan offset (positive looks right), applied to both eyes.
    pub pan: i32,
    /// Eye tilt offset (positive looks up), applied to both eyes.
    pub tilt: i32,
    /// Neck pan offset; ignored unless the animation drives the neck.
    pub neck: i32,
}

impl Keyframe {
    pub const REST: Keyframe = Keyframe {
        pan: 0,
        tilt: 0,
        neck: 0,
    };

    const fn eyes(pan: i32, tilt: i32) -> Self {
        Self { pan, tilt, neck: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeRollSettings {
    /// Radius of the circle the eyes trace, in servo units.
    pub radius: i32,
    /// Ticks each keyframe is held.
    pub dwell_ticks: u32,
}

impl Default for EyeRollSettings {
    fn default() -> Self {
        Self {
            radius: 200,
            dwell_ticks: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnoyedRollSettings {
    pub radius: i32,
    /// How far the neck turns away at the top of the roll.
    pub neck_offset: i32,
    pub dwell_ticks: u32,
}

impl Default for AnnoyedRollSettings {
    fn default() -> Self {
        Self {
            radius: 220,
            neck_offset: 200,
            dwell_ticks: 4,
        }
    }
}

/// A looping keyframe animation over the eyes, optionally the neck.
#[derive(Debug, Clone)]
pub struct RollAnimation {
    frames: Vec<Keyframe>,
    dwell: usize,
    drives_neck: bool,
    index: usize,
    anchor: Option<AxisState>,
}

impl RollAnimation {
    /// Build an animation.  A trailing [`Keyframe::REST`] is appended when
    /// the list does not already end with one.
    pub fn new(mut frames: Vec<Keyframe>, dwell_ticks: u32, drives_neck: bool) -> Self {
        if frames.last() != Some(&Keyframe::REST) {
            frames.push(Keyframe::REST);
        }
        Self {
            frames,
            dwell: dwell_ticks.max(1) as usize,
            drives_neck,
            index: 0,
            anchor: None,
        }
    }

    /// Eyes trace a full circle (up, clockwise) and return to rest.
    pub fn eye_roll(settings: &EyeRollSettings) -> Self {
        let r = settings.radius as f32;
        let frames = (0..8)
            .map(|k| {
                let theta = (k as f32 * 45.0).to_radians();
                Keyframe::eyes((r * theta.sin()).round() as i32, (r * theta.cos()).round() as i32)
            })
            .collect();
        Self::new(frames, settings.dwell_ticks, false)
    }

    /// Glance up-left, roll across the top while turning the head away,
    /// hold the pose, then come back.
    pub fn annoyed_eye_roll(settings: &AnnoyedRollSettings) -> Self {
        let r = settings.radius;
        let diag = (settings.radius as f32 * std::f32::consts::FRAC_1_SQRT_2).round() as i32;
        let n = settings.neck_offset.saturating_neg();
        let frames = vec![
            Keyframe::eyes(diag.saturating_neg(), diag),
            Keyframe {
                pan: 0,
                tilt: r,
                neck: n / 2,
            },
            Keyframe {
                pan: diag,
                tilt: diag,
                neck: n,
            },
            Keyframe {
                pan: diag,
                tilt: diag,
                neck: n,
            },
            Keyframe {
                pan: diag / 2,
                tilt: 0,
                neck: n / 2,
            },
            Keyframe::REST,
        ];
        Self::new(frames, settings.dwell_ticks, true)
    }

    /// Number of ticks in one full pass.
    pub fn len(&self) -> usize {
        self.frames.len() * self.dwell
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.frames
    }
}

impl Generator for RollAnimation {
    fn step(&mut self, axes: &mut AxisState, _target: Option<&TargetObservation>) -> Progress {
        let anchor = self.anchor.get_or_insert_with(|| axes.clone());
        let frame = self.frames[self.index / self.dwell];

        for pan in [Axis::RightPan, Axis::LeftPan] {
            axes.set(pan, anchor.get(pan).saturating_add(frame.pan));
        }
        for tilt in [Axis::RightTilt, Axis::LeftTilt] {
            let offset = tilt_up_sign(tilt).saturating_mul(frame.tilt);
            axes.set(tilt, anchor.get(tilt).saturating_add(offset));
        }
        if self.drives_neck {
            axes.set(Axis::NeckPan, anchor.get(Axis::NeckPan).saturating_add(frame.neck));
        }

        self.index = (self.index + 1) % self.len();
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

    #[test]
    fn eye_roll_starts_looking_up() {
        let mut a = axes();
        let start = a.clone();
        let mut roll = RollAnimation::eye_roll(&EyeRollSettings::default());
        roll.step(&mut a, None);
        assert_eq!(a.right_pan(), start.right_pan());
        assert_eq!(a.right_tilt(), start.right_tilt() + 200);
        // Left tilt servo is mirrored.
        assert_eq!(a.left_tilt(), start.left_tilt() - 200);
        assert_eq!(a.neck_pan(), start.neck_pan());
    }

    #[test]
    fn eye_roll_is_cyclic() {
        let mut a = axes();
        a.nudge(Axis::RightPan, 35);
        a.nudge(Axis::LeftTilt, -20);
        let start = a.clone();
        let mut roll = RollAnimation::eye_roll(&EyeRollSettings::default());
        let n = roll.len();
        assert_eq!(n, 9 * 3);
        for i in 0..n {
            roll.step(&mut a, None);
            if i + 1 < n - roll.dwell {
                assert_ne!(a, start, "tick {i} should be mid-roll");
            }
        }
        assert_eq!(a, start);

        // Second pass repeats the first.
        let mut second = Vec::new();
        for _ in 0..n {
            roll.step(&mut a, None);
            second.push(a.positions());
        }
        assert_eq!(a, start);
        assert_eq!(second[0][1], start.right_tilt() + 200);
    }

    #[test]
    fn annoyed_roll_is_cyclic_including_neck() {
        let mut a = axes();
        let start = a.clone();
        let mut roll = RollAnimation::annoyed_eye_roll(&AnnoyedRollSettings::default());
        let mut neck_moved = false;
        for _ in 0..roll.len() {
            roll.step(&mut a, None);
            neck_moved |= a.neck_pan() != start.neck_pan();
        }
        assert!(neck_moved);
        assert_eq!(a, start);
    }

    #[test]
    fn extreme_radii_stay_within_limits() {
        let mut a = axes();
        let start = a.clone();
        let mut rolls = [
            RollAnimation::eye_roll(&EyeRollSettings {
                radius: i32::MAX,
                dwell_ticks: 1,
            }),
            RollAnimation::eye_roll(&EyeRollSettings {
                radius: i32::MIN,
                dwell_ticks: 1,
            }),
            RollAnimation::annoyed_eye_roll(&AnnoyedRollSettings {
                radius: i32::MIN,
                neck_offset: i32::MIN,
                dwell_ticks: 1,
            }),
        ];
        for roll in &mut rolls {
            for _ in 0..roll.len() {
                roll.step(&mut a, None);
                for axis in Axis::ALL {
                    assert!(a.limits().range(axis).contains(a.get(axis)));
                }
            }
            assert_eq!(a, start);
        }
    }

    #[test]
    fn plain_roll_never_moves_neck() {
        let mut a = axes();
        let neck = a.neck_pan();
        let mut roll = RollAnimation::eye_roll(&EyeRollSettings {
            radius: 5000,
            dwell_ticks: 1,
        });
        for _ in 0..roll.len() * 2 {
            roll.step(&mut a, None);
            assert_eq!(a.neck_pan(), neck);
            for axis in Axis::ALL {
                assert!(a.limits().range(axis).contains(a.get(axis)));
            }
        }
    }

    #[test]
    fn rest_keyframe_is_appended_once() {
        let roll = RollAnimation::new(vec![Keyframe::eyes(10, 0)], 2, false);
        assert_eq!(roll.keyframes().len(), 2);
        assert_eq!(roll.len(), 4);
        let roll = RollAnimation::new(vec![Keyframe::eyes(10, 0), Keyframe::REST], 0, false);
        assert_eq!(roll.keyframes().len(), 2);
        assert_eq!(roll.len(), 2);
    }
}
