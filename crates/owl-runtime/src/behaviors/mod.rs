//! Behavior generators – one per non-idle [`Mode`][owl_types::Mode].
//!
//! A generator owns only its own progress (a phase counter, an anchor
//! pose, a convergence flag).  Everything it produces is written into the
//! [`AxisState`] through the clamping setters, so no generator can command
//! a position outside an axis's range.  Generators are created fresh each
//! time their mode is entered, which is what resets their phase.
//!
//! | Generator | Axes written |
//! |---|---|
//! | [`NeckSweep`] | neck pan |
//! | [`EyeSweep`] | both eye pans |
//! | [`ColorTrack`] | both eyes, pan and tilt, independently |
//! | [`RollAnimation`] | eyes (and neck for the annoyed variant) |
//! | [`PointFocus`] | both eye pans and neck pan |

pub mod focus;
pub mod roll;
pub mod sweep;
pub mod track;

pub use focus::{FocusSettings, PointFocus};
pub use roll::{AnnoyedRollSettings, EyeRollSettings, Keyframe, RollAnimation};
pub use sweep::{EyeSweep, EyeSweepSettings, NeckSweep, NeckSweepSettings};
pub use track::{ColorTrack, TrackSettings};

use owl_types::{Axis, AxisState, TargetObservation};
use serde::{Deserialize, Serialize};

/// What a generator reports after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Still moving (or running indefinitely).
    Running,
    /// Reached its target and is holding; further steps change nothing.
    Converged,
}

/// A per-mode motion generator, stepped once per tick while its mode is
/// active.
pub trait Generator {
    /// Advance by one tick, writing new positions into `axes`.
    ///
    /// `target` is the vision observation for this tick, if the loop ran the
    /// detector (only for modes that need one).
    fn step(&mut self, axes: &mut AxisState, target: Option<&TargetObservation>) -> Progress;
}

/// Tunables for every generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorSettings {
    pub neck_sweep: NeckSweepSettings,
    pub eye_sweep: EyeSweepSettings,
    pub track: TrackSettings,
    pub eye_roll: EyeRollSettings,
    pub annoyed_roll: AnnoyedRollSettings,
    pub focus: FocusSettings,
}

/// Sign applied to an "up" tilt offset for each eye.  The left tilt servo
/// is mounted mirrored, so looking up decreases its value.
pub(crate) fn tilt_up_sign(axis: Axis) -> i32 {
    match axis {
        Axis::LeftTilt => -1,
        _ => 1,
    }
}

/// Move `axis` toward `target` by at most `max_step`.  Returns the remaining
/// distance after the move.
pub(crate) fn approach(axes: &mut AxisState, axis: Axis, target: i32, max_step: i32) -> i32 {
    let current = axes.get(axis);
    let step = max_step.saturating_abs();
    let delta = target.saturating_sub(current).clamp(-step, step);
    let stored = axes.set(axis, current.saturating_add(delta));
    target.saturating_sub(stored)
}
