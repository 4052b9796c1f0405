//! Point fixation: turn the neck toward a focal point and verge both eyes
//! on it.
//!
//! Geometry, in the head's horizontal plane with the neck axis at the
//! origin and the point at `(lateral_mm, distance_mm)`:
//!
//! ```text
//! neck angle  θn = atan2(lateral, distance)
//! vergence    θv = atan((baseline / 2) / hypot(lateral, distance))
//! ```
//!
//! Once the neck faces the point, each eye rotates inward by `θv`: the right
//! eye pans left, the left eye pans right.  The closer the point, the larger
//! the vergence.

use owl_types::{Axis, AxisState, TargetObservation};
use serde::{Deserialize, Serialize};

use super::{Generator, Progress, approach};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusSettings {
    /// Sideways offset of the focal point (positive is to the owl's right).
    pub lateral_mm: f32,
    /// Forward distance of the focal point.
    pub distance_mm: f32,
    /// Distance between the two eye pivots.
    pub baseline_mm: f32,
    /// Servo units per degree of rotation.
    pub units_per_degree: f32,
    /// Largest change per tick on any axis.
    pub max_step: i32,
    /// All axes within this many units of their target counts as fixated.
    pub tolerance: i32,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            lateral_mm: 0.0,
            distance_mm: 300.0,
            baseline_mm: 67.0,
            units_per_degree: 10.0,
            max_step: 10,
            tolerance: 2,
        }
    }
}

/// Target positions for the three axes [`PointFocus`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTarget {
    pub right_pan: i32,
    pub left_pan: i32,
    pub neck_pan: i32,
}

impl FocusTarget {
    fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::RightPan => self.right_pan,
            Axis::LeftPan => self.left_pan,
            _ => self.neck_pan,
        }
    }
}

/// Converging fixation generator.
#[derive(Debug, Clone)]
pub struct PointFocus {
    settings: FocusSettings,
    converged: bool,
}

const DRIVEN: [Axis; 3] = [Axis::RightPan, Axis::LeftPan, Axis::NeckPan];

impl PointFocus {
    pub fn new(settings: FocusSettings) -> Self {
        Self {
            settings,
            converged: false,
        }
    }

    /// Servo targets for the configured focal point, clamped to each axis's
    /// range.
    pub fn target(&self, axes: &AxisState) -> FocusTarget {
        let s = &self.settings;
        let limits = axes.limits();
        let range = s.lateral_mm.hypot(s.distance_mm).max(f32::EPSILON);
        let neck_deg = s.lateral_mm.atan2(s.distance_mm).to_degrees();
        let verge_deg = (s.baseline_mm / 2.0 / range).atan().to_degrees();
        let to_units = |deg: f32| (deg * s.units_per_degree).round() as i32;

        let verge = to_units(verge_deg);
        FocusTarget {
            right_pan: limits.clamp(Axis::RightPan, limits.center(Axis::RightPan).saturating_sub(verge)),
            left_pan: limits.clamp(Axis::LeftPan, limits.center(Axis::LeftPan).saturating_add(verge)),
            neck_pan: limits.clamp(
                Axis::NeckPan,
                limits.center(Axis::NeckPan).saturating_add(to_units(neck_deg)),
            ),
        }
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }
}

impl Generator for PointFocus {
    fn step(&mut self, axes: &mut AxisState, _target: Option<&TargetObservation>) -> Progress {
        if self.converged {
            return Progress::Converged;
        }
        let target = self.target(axes);
        let tolerance = self.settings.tolerance.max(0).unsigned_abs();

        if DRIVEN
            .iter()
            .all(|&axis| target.get(axis).abs_diff(axes.get(axis)) <= tolerance)
        {
            self.converged = true;
            return Progress::Converged;
        }

        let step = self.settings.max_step.saturating_abs().max(1);
        for axis in DRIVEN {
            approach(axes, axis, target.get(axis), step);
        }
        Progress::Running
    }
}
