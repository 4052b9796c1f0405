//! Periodic pan sweeps for the neck and the eyes.

use std::f32::consts::TAU;

use owl_types::{Axis, AxisState, TargetObservation};
use serde::{Deserialize, Serialize};

use super::{Generator, Progress};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeckSweepSettings {
    /// Peak offset from the neck centre, in servo units.
    pub amplitude: i32,
    /// Ticks per full left-right-left cycle.
    pub period_ticks: u32,
}

impl Default for NeckSweepSettings {
    fn default() -> Self {
        Self {
            amplitude: 300,
            period_ticks: 120,
        }
    }
}

/// Sinusoidal neck pan around the neck centre.
///
/// `neck = center + round(amplitude * sin(2π t / period))`, with `t` counting
/// ticks since the mode was entered.
#[derive(Debug, Clone)]
pub struct NeckSweep {
    settings: NeckSweepSettings,
    t: u32,
}

impl NeckSweep {
    pub fn new(settings: NeckSweepSettings) -> Self {
        Self { settings, t: 0 }
    }

    /// Offset the sweep produces at phase `t`.
    pub fn offset_at(&self, t: u32) -> i32 {
        let period = self.settings.period_ticks.max(1);
        let phase = (t % period) as f32 / period as f32;
        (self.settings.amplitude as f32 * (TAU * phase).sin()).round() as i32
    }
}

impl Generator for NeckSweep {
    fn step(&mut self, axes: &mut AxisState, _target: Option<&TargetObservation>) -> Progress {
        axes.set_offset(Axis::NeckPan, self.offset_at(self.t));
        self.t = (self.t + 1) % self.settings.period_ticks.max(1);
        Progress::Running
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeSweepSettings {
    /// Peak pan offset from each eye's centre.
    pub amplitude: i32,
    /// Pan change per tick.
    pub speed: i32,
    /// Drive the left eye with the negated offset (eyes cross and diverge)
    /// instead of moving both the same way.
    pub mirrored: bool,
}

impl Default for EyeSweepSettings {
    fn default() -> Self {
        Self {
            amplitude: 250,
            speed: 25,
            mirrored: false,
        }
    }
}

/// Triangle-wave pan of both eyes between `±amplitude`.  Tilt is untouched.
#[derive(Debug, Clone)]
pub struct EyeSweep {
    settings: EyeSweepSettings,
    offset: i32,
    direction: i32,
}

impl EyeSweep {
    pub fn new(settings: EyeSweepSettings) -> Self {
        Self {
            settings,
            offset: 0,
            direction: 1,
        }
    }
}

impl Generator for EyeSweep {
    fn step(&mut self, axes: &mut AxisState, _target: Option<&TargetObservation>) -> Progress {
        let amplitude = self.settings.amplitude.saturating_abs();
        let speed = self.settings.speed.saturating_abs().max(1);
        self.offset = self.offset.saturating_add(self.direction * speed);
        if self.offset >= amplitude {
            self.offset = amplitude;
            self.direction = -1;
        } else if self.offset <= -amplitude {
            self.offset = -amplitude;
            self.direction = 1;
        }

        let left = if self.settings.mirrored {
            -self.offset
        } else {
            self.offset
        };
        axes.set_offset(Axis::RightPan, self.offset);
        axes.set_offset(Axis::LeftPan, left);
        Progress::Running
    }
}
