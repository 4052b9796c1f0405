//! Operator-facing modes, raw key events, and vision observations.

use serde::{Deserialize, Serialize};

/// The active motion behavior.  Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// No generator runs; only manual nudges move the head.
    #[default]
    Idle,
    NeckPanSweep,
    EyePanSweep,
    /// Each eye follows a coloured target in its own image.
    ColorTrack,
    EyeRoll,
    AnnoyedEyeRoll,
    /// Both eyes verge on a fixed focal point while the neck faces it.
    PointFocus,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Idle,
        Mode::NeckPanSweep,
        Mode::EyePanSweep,
        Mode::ColorTrack,
        Mode::EyeRoll,
        Mode::AnnoyedEyeRoll,
        Mode::PointFocus,
    ];

    /// `true` for modes that need a [`TargetObservation`] every tick.
    pub fn needs_target(self) -> bool {
        matches!(self, Mode::ColorTrack)
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::NeckPanSweep => "neck-pan-sweep",
            Mode::EyePanSweep => "eye-pan-sweep",
            Mode::ColorTrack => "color-track",
            Mode::EyeRoll => "eye-roll",
            Mode::AnnoyedEyeRoll => "annoyed-eye-roll",
            Mode::PointFocus => "point-focus",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single key event read from the operator surface.
///
/// Keys are abstract: the terminal driver maps its own key codes onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Escape,
    /// Ctrl-C delivered as a key (raw terminal mode).  Treated by the control
    /// loop as an external stop request, never as a mode key.
    Interrupt,
}

/// A pixel coordinate inside one eye's image (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f32,
    pub y: f32,
}

impl ImagePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Where the tracked target was seen in each eye's image this tick.
///
/// `None` for an eye means "not found".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetObservation {
    pub right: Option<ImagePoint>,
    pub left: Option<ImagePoint>,
}

impl TargetObservation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.right.is_none() && self.left.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_idle() {
        assert_eq!(Mode::default(), Mode::Idle);
    }

    #[test]
    fn only_color_track_needs_a_target() {
        let needing: Vec<Mode> = Mode::ALL.into_iter().filter(|m| m.needs_target()).collect();
        assert_eq!(needing, vec![Mode::ColorTrack]);
    }

    #[test]
    fn mode_serializes_snake_case() {
        let json = serde_json::to_string(&Mode::AnnoyedEyeRoll).unwrap();
        assert_eq!(json, "\"annoyed_eye_roll\"");
        let back: Mode = serde_json::from_str("\"point_focus\"").unwrap();
        assert_eq!(back, Mode::PointFocus);
    }

    #[test]
    fn empty_observation() {
        assert!(TargetObservation::none().is_empty());
        let seen = TargetObservation {
            right: Some(ImagePoint::new(10.0, 20.0)),
            left: None,
        };
        assert!(!seen.is_empty());
    }
}
