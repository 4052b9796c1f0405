//! [`ModeMachine`] – turns operator keys into mode changes and nudges, and
//! steps the active behavior generator once per tick.
//!
//! # Transitions
//!
//! | Key | Effect (from any mode) |
//! |---|---|
//! | cancel (Escape) | mode → Idle and every axis re-centred |
//! | mode select | mode → selected, with a fresh generator (phase 0) |
//! | nudge | one axis moves by ±`nudge_step` |
//! | anything else | no-op |
//!
//! Nudges are accepted even while a generator is running.  The generator's
//! next step may then overwrite the nudged axis (a sweep will, a tracker
//! only adds to it).  Set `nudge_while_active = false` to ignore nudges
//! outside Idle instead.

use std::collections::HashMap;

use owl_types::{Axis, AxisState, Key, Mode, TargetObservation};
use tracing::{debug, info};

use crate::behaviors::{
    BehaviorSettings, ColorTrack, EyeSweep, Generator, NeckSweep, PointFocus, Progress,
    RollAnimation,
};

// ─────────────────────────────────────────────────────────────────────────────
// Keymap
// ─────────────────────────────────────────────────────────────────────────────

/// What a key asks the machine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Stop everything and re-centre.
    Cancel,
    Select(Mode),
    /// Move `axis` by `direction * nudge_step`.
    Nudge { axis: Axis, direction: i32 },
}

/// Mapping from keys to [`Control`]s.
#[derive(Debug, Clone)]
pub struct Keymap {
    bindings: HashMap<Key, Control>,
}

impl Default for Keymap {
    fn default() -> Self {
        let nudge = |axis, direction| Control::Nudge { axis, direction };
        let bindings = HashMap::from([
            (Key::Char('w'), nudge(Axis::RightTilt, 1)),
            (Key::Char('s'), nudge(Axis::RightTilt, -1)),
            (Key::Char('a'), nudge(Axis::RightPan, -1)),
            (Key::Char('d'), nudge(Axis::RightPan, 1)),
            // Left tilt servo is mirrored: "up" decreases it.
            (Key::Char('i'), nudge(Axis::LeftTilt, -1)),
            (Key::Char('k'), nudge(Axis::LeftTilt, 1)),
            (Key::Char('j'), nudge(Axis::LeftPan, -1)),
            (Key::Char('l'), nudge(Axis::LeftPan, 1)),
            (Key::Char('q'), nudge(Axis::NeckPan, -1)),
            (Key::Char('e'), nudge(Axis::NeckPan, 1)),
            (Key::Char('n'), Control::Select(Mode::NeckPanSweep)),
            (Key::Char('x'), Control::Select(Mode::EyePanSweep)),
            (Key::Char('c'), Control::Select(Mode::ColorTrack)),
            (Key::Char('o'), Control::Select(Mode::EyeRoll)),
            (Key::Char('r'), Control::Select(Mode::AnnoyedEyeRoll)),
            (Key::Char('f'), Control::Select(Mode::PointFocus)),
            (Key::Escape, Control::Cancel),
        ]);
        Self { bindings }
    }
}

impl Keymap {
    pub fn resolve(&self, key: Key) -> Option<Control> {
        self.bindings.get(&key).copied()
    }

    /// Human-readable `(key, effect)` rows, sorted by key, for help output.
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut rows: Vec<(String, String)> = self
            .bindings
            .iter()
            .map(|(key, control)| {
                let key = match key {
                    Key::Char(c) => c.to_string(),
                    Key::Escape => "Esc".to_string(),
                    Key::Interrupt => "Ctrl-C".to_string(),
                };
                let effect = match control {
                    Control::Cancel => "stop, mode → idle, centre all axes".to_string(),
                    Control::Select(mode) => format!("mode → {mode}"),
                    Control::Nudge { axis, direction } => {
                        format!("nudge {axis} {}", if *direction > 0 { "+" } else { "-" })
                    }
                };
                (key, effect)
            })
            .collect();
        rows.sort();
        rows
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Active behavior
// ─────────────────────────────────────────────────────────────────────────────

/// The current mode together with its generator's private progress.
#[derive(Debug, Clone)]
enum ActiveBehavior {
    Idle,
    NeckPanSweep(NeckSweep),
    EyePanSweep(EyeSweep),
    ColorTrack(ColorTrack),
    EyeRoll(RollAnimation),
    AnnoyedEyeRoll(RollAnimation),
    PointFocus(PointFocus),
}

impl ActiveBehavior {
    fn enter(mode: Mode, settings: &BehaviorSettings) -> Self {
        match mode {
            Mode::Idle => Self::Idle,
            Mode::NeckPanSweep => Self::NeckPanSweep(NeckSweep::new(settings.neck_sweep.clone())),
            Mode::EyePanSweep => Self::EyePanSweep(EyeSweep::new(settings.eye_sweep.clone())),
            Mode::ColorTrack => Self::ColorTrack(ColorTrack::new(settings.track.clone())),
            Mode::EyeRoll => Self::EyeRoll(RollAnimation::eye_roll(&settings.eye_roll)),
            Mode::AnnoyedEyeRoll => {
                Self::AnnoyedEyeRoll(RollAnimation::annoyed_eye_roll(&settings.annoyed_roll))
            }
            Mode::PointFocus => Self::PointFocus(PointFocus::new(settings.focus.clone())),
        }
    }

    fn mode(&self) -> Mode {
        match self {
            Self::Idle => Mode::Idle,
            Self::NeckPanSweep(_) => Mode::NeckPanSweep,
            Self::EyePanSweep(_) => Mode::EyePanSweep,
            Self::ColorTrack(_) => Mode::ColorTrack,
            Self::EyeRoll(_) => Mode::EyeRoll,
            Self::AnnoyedEyeRoll(_) => Mode::AnnoyedEyeRoll,
            Self::PointFocus(_) => Mode::PointFocus,
        }
    }

    fn generator(&mut self) -> Option<&mut dyn Generator> {
        match self {
            Self::Idle => None,
            Self::NeckPanSweep(g) => Some(g),
            Self::EyePanSweep(g) => Some(g),
            Self::ColorTrack(g) => Some(g),
            Self::EyeRoll(g) | Self::AnnoyedEyeRoll(g) => Some(g),
            Self::PointFocus(g) => Some(g),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ModeMachine
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of feeding one key to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No key, or a key with no binding.
    None,
    /// An axis was nudged; `value` is the clamped result.
    Nudged { axis: Axis, value: i32 },
    /// A mode was (re-)entered.
    Entered(Mode),
    /// Mode forced to Idle and all axes centred.
    Cancelled,
    /// A nudge was ignored because a generator is active and
    /// `nudge_while_active` is off.
    Suppressed(Axis),
}

/// Operator-facing settings of the machine.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSettings {
    /// Servo units moved per nudge key.
    pub nudge_step: i32,
    /// Accept nudges while a generator is running.
    pub nudge_while_active: bool,
    pub behaviors: BehaviorSettings,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            nudge_step: 5,
            nudge_while_active: true,
            behaviors: BehaviorSettings::default(),
        }
    }
}

/// The mode state machine.
///
/// # Example
///
/// ```rust
/// use owl_runtime::mode_machine::{MachineSettings, ModeMachine, Transition};
/// use owl_types::{AxisLimits, AxisState, Key, Mode};
///
/// let mut axes = AxisState::new(AxisLimits::default()).unwrap();
/// let mut machine = ModeMachine::new(MachineSettings::default());
///
/// assert_eq!(machine.apply_key(Some(Key::Char('n')), &mut axes), Transition::Entered(Mode::NeckPanSweep));
/// machine.tick(&mut axes, None);
/// assert_eq!(machine.apply_key(Some(Key::Escape), &mut axes), Transition::Cancelled);
/// assert!(axes.is_centered());
/// ```
#[derive(Debug, Clone)]
pub struct ModeMachine {
    active: ActiveBehavior,
    keymap: Keymap,
    settings: MachineSettings,
}

impl ModeMachine {
    pub fn new(settings: MachineSettings) -> Self {
        Self::with_keymap(settings, Keymap::default())
    }

    pub fn with_keymap(settings: MachineSettings, keymap: Keymap) -> Self {
        Self {
            active: ActiveBehavior::Idle,
            keymap,
            settings,
        }
    }

    pub fn mode(&self) -> Mode {
        self.active.mode()
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    /// Apply this tick's key (if any).
    pub fn apply_key(&mut self, key: Option<Key>, axes: &mut AxisState) -> Transition {
        let Some(control) = key.and_then(|k| self.keymap.resolve(k)) else {
            return Transition::None;
        };

        match control {
            Control::Cancel => {
                if self.mode() != Mode::Idle {
                    info!(from = %self.mode(), "cancel: mode → idle");
                }
                self.active = ActiveBehavior::Idle;
                axes.center_all();
                Transition::Cancelled
            }
            Control::Select(mode) => {
                info!(from = %self.mode(), to = %mode, "mode change");
                self.active = ActiveBehavior::enter(mode, &self.settings.behaviors);
                Transition::Entered(mode)
            }
            Control::Nudge { axis, direction } => {
                if self.mode() != Mode::Idle && !self.settings.nudge_while_active {
                    debug!(%axis, mode = %self.mode(), "nudge suppressed while generator active");
                    return Transition::Suppressed(axis);
                }
                let value = axes.nudge(axis, direction * self.settings.nudge_step);
                debug!(%axis, value, "nudge");
                Transition::Nudged { axis, value }
            }
        }
    }

    /// Step the active generator.  Returns `None` in Idle.
    pub fn tick(&mut self, axes: &mut AxisState, target: Option<&TargetObservation>) -> Option<Progress> {
        self.active.generator().map(|g| g.step(axes, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use owl_types::AxisLimits;
    use proptest::prelude::*;

    fn axes() -> AxisState {
        AxisState::new(AxisLimits::default()).unwrap()
    }

    fn machine() -> ModeMachine {
        ModeMachine::new(MachineSettings::default())
    }

    fn key(c: char) -> Option<Key> {
        Some(Key::Char(c))
    }

    #[test]
    fn starts_idle_and_idle_tick_does_nothing() {
        let mut m = machine();
        let mut a = axes();
        assert_eq!(m.mode(), Mode::Idle);
        assert_eq!(m.tick(&mut a, None), None);
        assert!(a.is_centered());
    }

    #[test]
    fn three_right_pan_nudges_then_cancel() {
        let mut m = machine();
        let mut a = axes();
        let center = a.right_pan();
        for _ in 0..3 {
            assert!(matches!(
                m.apply_key(key('d'), &mut a),
                Transition::Nudged { axis: Axis::RightPan, .. }
            ));
        }
        assert_eq!(a.right_pan(), center + 15);
        for axis in [Axis::RightTilt, Axis::LeftPan, Axis::LeftTilt, Axis::NeckPan] {
            assert_eq!(a.get(axis), a.limits().center(axis));
        }
        assert_eq!(m.apply_key(Some(Key::Escape), &mut a), Transition::Cancelled);
        assert!(a.is_centered());
        assert_eq!(m.mode(), Mode::Idle);
    }

    #[test]
    fn every_nudge_key_moves_its_axis() {
        let cases = [
            ('w', Axis::RightTilt, 5),
            ('s', Axis::RightTilt, -5),
            ('a', Axis::RightPan, -5),
            ('d', Axis::RightPan, 5),
            ('i', Axis::LeftTilt, -5),
            ('k', Axis::LeftTilt, 5),
            ('j', Axis::LeftPan, -5),
            ('l', Axis::LeftPan, 5),
            ('q', Axis::NeckPan, -5),
            ('e', Axis::NeckPan, 5),
        ];
        for (c, axis, delta) in cases {
            let mut m = machine();
            let mut a = axes();
            m.apply_key(key(c), &mut a);
            assert_eq!(a.get(axis) - a.limits().center(axis), delta, "key {c}");
        }
    }

    #[test]
    fn mode_keys_select_modes() {
        let cases = [
            ('n', Mode::NeckPanSweep),
            ('x', Mode::EyePanSweep),
            ('c', Mode::ColorTrack),
            ('o', Mode::EyeRoll),
            ('r', Mode::AnnoyedEyeRoll),
            ('f', Mode::PointFocus),
        ];
        for (c, mode) in cases {
            let mut m = machine();
            let mut a = axes();
            assert_eq!(m.apply_key(key(c), &mut a), Transition::Entered(mode));
            assert_eq!(m.mode(), mode);
            assert!(a.is_centered(), "selecting a mode must not move axes");
        }
    }

    #[test]
    fn unknown_keys_and_interrupt_are_no_ops() {
        let mut m = machine();
        let mut a = axes();
        m.apply_key(key('o'), &mut a);
        m.tick(&mut a, None);
        let before = a.clone();
        for k in [key('z'), key('W'), Some(Key::Interrupt), None] {
            assert_eq!(m.apply_key(k, &mut a), Transition::None);
        }
        assert_eq!(a, before);
        assert_eq!(m.mode(), Mode::EyeRoll);
    }

    #[test]
    fn reselecting_restarts_generator_phase() {
        let mut m = machine();
        let mut a = axes();
        m.apply_key(key('n'), &mut a);
        for _ in 0..10 {
            m.tick(&mut a, None);
        }
        assert_ne!(a.neck_pan(), a.limits().neck_pan.center);
        m.apply_key(key('n'), &mut a);
        m.tick(&mut a, None);
        assert_eq!(a.neck_pan(), a.limits().neck_pan.center);
    }

    #[test]
    fn switching_modes_discards_previous_progress() {
        let mut m = machine();
        let mut a = axes();
        m.apply_key(key('f'), &mut a);
        for _ in 0..30 {
            m.tick(&mut a, None);
        }
        assert_eq!(m.tick(&mut a, None), Some(Progress::Converged));
        m.apply_key(key('o'), &mut a);
        m.apply_key(key('f'), &mut a);
        // Fresh focus generator re-checks convergence on its first step.
        assert_eq!(m.tick(&mut a, None), Some(Progress::Converged));
        a.nudge(Axis::RightPan, 40);
        m.apply_key(key('f'), &mut a);
        assert_eq!(m.tick(&mut a, None), Some(Progress::Running));
    }

    #[test]
    fn nudge_during_sweep_is_applied_then_overwritten() {
        let mut m = machine();
        let mut a = axes();
        m.apply_key(key('n'), &mut a);
        m.tick(&mut a, None);
        m.tick(&mut a, None);
        let swept = a.neck_pan();

        let t = m.apply_key(key('e'), &mut a);
        assert_eq!(t, Transition::Nudged { axis: Axis::NeckPan, value: swept + 5 });
        assert_eq!(a.neck_pan(), swept + 5);

        // The sweep's next step writes the neck from its own phase.
        m.tick(&mut a, None);
        let mut reference = machine();
        let mut b = axes();
        reference.apply_key(key('n'), &mut b);
        for _ in 0..3 {
            reference.tick(&mut b, None);
        }
        assert_eq!(a.neck_pan(), b.neck_pan());
    }

    #[test]
    fn nudge_during_sweep_on_other_axis_survives() {
        let mut m = machine();
        let mut a = axes();
        m.apply_key(key('n'), &mut a);
        m.apply_key(key('w'), &mut a);
        m.tick(&mut a, None);
        assert_eq!(a.right_tilt(), a.limits().right_tilt.center + 5);
    }

    #[test]
    fn nudges_can_be_suppressed_while_active() {
        let mut m = ModeMachine::new(MachineSettings {
            nudge_while_active: false,
            ..MachineSettings::default()
        });
        let mut a = axes();
        m.apply_key(key('x'), &mut a);
        assert_eq!(m.apply_key(key('d'), &mut a), Transition::Suppressed(Axis::RightPan));
        assert!(a.is_centered());
        // Cancel still works, and nudges work again in Idle.
        m.apply_key(Some(Key::Escape), &mut a);
        assert!(matches!(m.apply_key(key('d'), &mut a), Transition::Nudged { .. }));
    }

    #[test]
    fn color_track_uses_observation() {
        let mut m = machine();
        let mut a = axes();
        m.apply_key(key('c'), &mut a);
        let obs = TargetObservation {
            right: Some(owl_types::ImagePoint::new(420.0, 240.0)),
            left: None,
        };
        m.tick(&mut a, Some(&obs));
        assert!(a.right_pan() > a.limits().right_pan.center);
        assert_eq!(a.left_pan(), a.limits().left_pan.center);
    }

    #[test]
    fn keymap_describes_every_binding() {
        let rows = Keymap::default().describe();
        assert_eq!(rows.len(), 17);
        assert!(rows.iter().any(|(k, e)| k == "Esc" && e.contains("idle")));
        assert!(rows.iter().any(|(k, e)| k == "f" && e.contains("point-focus")));
    }

    fn any_key() -> impl Strategy<Value = Option<Key>> {
        prop_oneof![
            Just(None),
            Just(Some(Key::Escape)),
            Just(Some(Key::Interrupt)),
            proptest::char::range('a', 'z').prop_map(|c| Some(Key::Char(c))),
        ]
    }

    proptest! {
        #[test]
        fn cancel_always_wins(
            keys in proptest::collection::vec(any_key(), 0..60),
            ticks in 0usize..4,
        ) {
            let mut m = machine();
            let mut a = axes();
            for k in keys {
                m.apply_key(k, &mut a);
                for _ in 0..ticks {
                    m.tick(&mut a, Some(&TargetObservation {
                        right: Some(owl_types::ImagePoint::new(600.0, 20.0)),
                        left: Some(owl_types::ImagePoint::new(10.0, 470.0)),
                    }));
                }
            }
            prop_assert_eq!(m.apply_key(Some(Key::Escape), &mut a), Transition::Cancelled);
            prop_assert_eq!(m.mode(), Mode::Idle);
            prop_assert!(a.is_centered());
        }

        #[test]
        fn transitions_are_total_and_deterministic(
            prefix in proptest::collection::vec(any_key(), 0..30),
            k in any_key(),
        ) {
            let mut m = machine();
            let mut a = axes();
            for p in prefix {
                m.apply_key(p, &mut a);
                m.tick(&mut a, None);
            }
            let (mut m2, mut a2) = (m.clone(), a.clone());
            let t1 = m.apply_key(k, &mut a);
            let t2 = m2.apply_key(k, &mut a2);
            prop_assert_eq!(t1, t2);
            prop_assert_eq!(m.mode(), m2.mode());
            prop_assert_eq!(&a, &a2);
            for axis in Axis::ALL {
                prop_assert!(a.limits().range(axis).contains(a.get(axis)));
            }
        }
    }
}
