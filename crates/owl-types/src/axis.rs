//! Servo axes, their safety limits, and the clamped [`AxisState`].
//!
//! [`AxisState`] is the only place axis values are stored.  Its fields are
//! private: every write goes through [`AxisState::set`] (or a helper built
//! on it), which clamps the proposed value to the axis's [`AxisRange`].  No
//! code path can hold an out-of-range position, so nothing downstream can
//! command one.

use serde::{Deserialize, Serialize};

use crate::error::OwlError;

/// One controllable degree of freedom of the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    RightPan,
    RightTilt,
    LeftPan,
    LeftTilt,
    NeckPan,
}

impl Axis {
    /// All axes, in wire order.
    pub const ALL: [Axis; 5] = [
        Axis::RightPan,
        Axis::RightTilt,
        Axis::LeftPan,
        Axis::LeftTilt,
        Axis::NeckPan,
    ];

    /// Position of this axis in [`Axis::ALL`] and in the wire command.
    pub fn index(self) -> usize {
        match self {
            Axis::RightPan => 0,
            Axis::RightTilt => 1,
            Axis::LeftPan => 2,
            Axis::LeftTilt => 3,
            Axis::NeckPan => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::RightPan => "right_pan",
            Axis::RightTilt => "right_tilt",
            Axis::LeftPan => "left_pan",
            Axis::LeftTilt => "left_tilt",
            Axis::NeckPan => "neck_pan",
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Legal range and rest position of a single axis, in servo units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
    pub center: i32,
}

impl AxisRange {
    pub const fn new(min: i32, max: i32, center: i32) -> Self {
        Self { min, max, center }
    }

    /// Bound `value` to `[min, max]`.
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    fn validate(&self, axis: Axis) -> Result<(), OwlError> {
        if self.min > self.max {
            return Err(OwlError::InvalidConfig(format!(
                "{axis}: min {} is greater than max {}",
                self.min, self.max
            )));
        }
        if !self.contains(self.center) {
            return Err(OwlError::InvalidConfig(format!(
                "{axis}: center {} lies outside [{}, {}]",
                self.center, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Hardware safety limits for all five axes.
///
/// The defaults are the owl's servo pulse-width limits.  The left tilt servo
/// is mounted mirrored, so its "up" direction is decreasing values.
///
/// When deserialised, any axis or field left out keeps its default, so
/// `[neck_pan]` with only `max = 1800` narrows that one bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LimitsOverride")]
pub struct AxisLimits {
    pub right_pan: AxisRange,
    pub right_tilt: AxisRange,
    pub left_pan: AxisRange,
    pub left_tilt: AxisRange,
    pub neck_pan: AxisRange,
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self {
            right_pan: AxisRange::new(1110, 1890, 1535),
            right_tilt: AxisRange::new(1120, 2000, 1545),
            left_pan: AxisRange::new(1190, 1850, 1520),
            left_tilt: AxisRange::new(1180, 2000, 1460),
            neck_pan: AxisRange::new(1100, 1950, 1540),
        }
    }
}

/// Partial `[limits]` table as written in a config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LimitsOverride {
    right_pan: RangeOverride,
    right_tilt: RangeOverride,
    left_pan: RangeOverride,
    left_tilt: RangeOverride,
    neck_pan: RangeOverride,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RangeOverride {
    min: Option<i32>,
    max: Option<i32>,
    center: Option<i32>,
}

impl RangeOverride {
    fn over(self, base: AxisRange) -> AxisRange {
        AxisRange {
            min: self.min.unwrap_or(base.min),
            max: self.max.unwrap_or(base.max),
            center: self.center.unwrap_or(base.center),
        }
    }
}

impl From<LimitsOverride> for AxisLimits {
    fn from(o: LimitsOverride) -> Self {
        let base = AxisLimits::default();
        Self {
            right_pan: o.right_pan.over(base.right_pan),
            right_tilt: o.right_tilt.over(base.right_tilt),
            left_pan: o.left_pan.over(base.left_pan),
            left_tilt: o.left_tilt.over(base.left_tilt),
            neck_pan: o.neck_pan.over(base.neck_pan),
        }
    }
}

impl AxisLimits {
    pub fn range(&self, axis: Axis) -> &AxisRange {
        match axis {
            Axis::RightPan => &self.right_pan,
            Axis::RightTilt => &self.right_tilt,
            Axis::LeftPan => &self.left_pan,
            Axis::LeftTilt => &self.left_tilt,
            Axis::NeckPan => &self.neck_pan,
        }
    }

    /// Bound `value` to the legal range of `axis`.
    pub fn clamp(&self, axis: Axis, value: i32) -> i32 {
        self.range(axis).clamp(value)
    }

    pub fn center(&self, axis: Axis) -> i32 {
        self.range(axis).center
    }

    /// Reject ranges that are empty or whose center lies outside them.
    ///
    /// # Errors
    ///
    /// Returns [`OwlError::InvalidConfig`] naming the first offending axis.
    pub fn validate(&self) -> Result<(), OwlError> {
        for axis in Axis::ALL {
            self.range(axis).validate(axis)?;
        }
        Ok(())
    }
}

/// Current position of every axis.
///
/// Starts at the center of every range and is only ever mutated through
/// clamping setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisState {
    limits: AxisLimits,
    values: [i32; 5],
}

impl AxisState {
    /// Create a state with every axis at its center.
    ///
    /// # Errors
    ///
    /// Returns [`OwlError::InvalidConfig`] if `limits` fails
    /// [`AxisLimits::validate`].
    pub fn new(limits: AxisLimits) -> Result<Self, OwlError> {
        limits.validate()?;
        let mut state = Self {
            limits,
            values: [0; 5],
        };
        state.center_all();
        Ok(state)
    }

    pub fn limits(&self) -> &AxisLimits {
        &self.limits
    }

    pub fn get(&self, axis: Axis) -> i32 {
        self.values[axis.index()]
    }

    /// Store `value` for `axis`, clamped to its range.  Returns the value
    /// actually stored.
    pub fn set(&mut self, axis: Axis, value: i32) -> i32 {
        let clamped = self.limits.clamp(axis, value);
        self.values[axis.index()] = clamped;
        clamped
    }

    /// Move `axis` by `delta`, clamped.  Returns the value actually stored.
    pub fn nudge(&mut self, axis: Axis, delta: i32) -> i32 {
        self.set(axis, self.get(axis).saturating_add(delta))
    }

    /// Store `center(axis) + offset`, clamped.
    pub fn set_offset(&mut self, axis: Axis, offset: i32) -> i32 {
        self.set(axis, self.limits.center(axis).saturating_add(offset))
    }

    /// Reset one axis to its center.
    pub fn center(&mut self, axis: Axis) {
        self.values[axis.index()] = self.limits.center(axis);
    }

    /// Reset all five axes to their centers.
    pub fn center_all(&mut self) {
        for axis in Axis::ALL {
            self.center(axis);
        }
    }

    pub fn is_centered(&self) -> bool {
        Axis::ALL
            .iter()
            .all(|&axis| self.get(axis) == self.limits.center(axis))
    }

    /// All positions in wire order.
    pub fn positions(&self) -> [i32; 5] {
        self.values
    }

    pub fn right_pan(&self) -> i32 {
        self.get(Axis::RightPan)
    }

    pub fn right_tilt(&self) -> i32 {
        self.get(Axis::RightTilt)
    }

    pub fn left_pan(&self) -> i32 {
        self.get(Axis::LeftPan)
    }

    pub fn left_tilt(&self) -> i32 {
        self.get(Axis::LeftTilt)
    }

    pub fn neck_pan(&self) -> i32 {
        self.get(Axis::NeckPan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state() -> AxisState {
        AxisState::new(AxisLimits::default()).unwrap()
    }

    #[test]
    fn new_state_starts_centered() {
        let s = state();
        assert!(s.is_centered());
        assert_eq!(s.right_pan(), 1535);
        assert_eq!(s.left_tilt(), 1460);
        assert_eq!(s.neck_pan(), 1540);
    }

    #[test]
    fn set_clamps_silently() {
        let mut s = state();
        assert_eq!(s.set(Axis::NeckPan, 10_000), 1950);
        assert_eq!(s.neck_pan(), 1950);
        assert_eq!(s.set(Axis::NeckPan, -10_000), 1100);
        assert_eq!(s.set(Axis::RightTilt, 1500), 1500);
    }

    #[test]
    fn nudge_saturates_instead_of_overflowing() {
        let mut s = state();
        assert_eq!(s.nudge(Axis::LeftPan, i32::MAX), 1850);
        assert_eq!(s.nudge(Axis::LeftPan, i32::MIN), 1190);
    }

    #[test]
    fn center_resets_a_single_axis() {
        let mut s = state();
        s.nudge(Axis::RightPan, 40);
        s.nudge(Axis::LeftPan, -40);
        s.center(Axis::RightPan);
        assert_eq!(s.right_pan(), 1535);
        assert_eq!(s.left_pan(), 1480);
    }

    #[test]
    fn center_all_is_idempotent() {
        let mut s = state();
        s.nudge(Axis::RightTilt, 55);
        s.nudge(Axis::NeckPan, -300);
        s.center_all();
        let once = s.clone();
        s.center_all();
        assert_eq!(s, once);
        assert!(s.is_centered());
    }

    #[test]
    fn positions_follow_wire_order() {
        let mut s = state();
        for (i, axis) in Axis::ALL.into_iter().enumerate() {
            assert_eq!(axis.index(), i);
            let min = s.limits().range(axis).min;
            s.set(axis, min + i as i32);
        }
        let p = s.positions();
        assert_eq!(p[0], 1110);
        assert_eq!(p[1], 1121);
        assert_eq!(p[2], 1192);
        assert_eq!(p[3], 1183);
        assert_eq!(p[4], 1104);
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let mut limits = AxisLimits::default();
        limits.left_pan = AxisRange::new(1900, 1100, 1500);
        let err = AxisState::new(limits).unwrap_err();
        assert!(matches!(err, OwlError::InvalidConfig(ref m) if m.contains("left_pan")));
    }

    #[test]
    fn validate_rejects_center_outside_range() {
        let mut limits = AxisLimits::default();
        limits.neck_pan.center = 2500;
        assert!(matches!(
            limits.validate(),
            Err(OwlError::InvalidConfig(ref m)) if m.contains("neck_pan")
        ));
    }

    #[test]
    fn limits_deserialize_with_partial_override() {
        let limits: AxisLimits = toml::from_str(
            r#"
            [neck_pan]
            min = 1200
            max = 1800
            center = 1500
            "#,
        )
        .unwrap();
        assert_eq!(limits.neck_pan, AxisRange::new(1200, 1800, 1500));
        assert_eq!(limits.right_pan, AxisLimits::default().right_pan);
    }

    #[test]
    fn missing_range_fields_keep_that_axis_defaults() {
        let limits: AxisLimits = toml::from_str(
            r#"
            [neck_pan]
            max = 1800

            [left_tilt]
            center = 1500
            "#,
        )
        .unwrap();
        assert_eq!(limits.neck_pan, AxisRange::new(1100, 1800, 1540));
        assert_eq!(limits.left_tilt, AxisRange::new(1180, 2000, 1500));
        assert_eq!(limits.right_tilt, AxisLimits::default().right_tilt);

        let empty: AxisLimits = toml::from_str("").unwrap();
        assert_eq!(empty, AxisLimits::default());
    }

    proptest! {
        #[test]
        fn every_mutation_stays_in_range(
            ops in proptest::collection::vec((0usize..5, -5_000i32..5_000, 0u8..4), 1..200)
        ) {
            let mut s = state();
            for (idx, amount, kind) in ops {
                let axis = Axis::ALL[idx];
                match kind {
                    0 => { s.nudge(axis, amount); }
                    1 => { s.set(axis, amount * 10); }
                    2 => { s.set_offset(axis, amount); }
                    _ => s.center(axis),
                }
                for axis in Axis::ALL {
                    prop_assert!(s.limits().range(axis).contains(s.get(axis)));
                }
            }
        }
    }
}
