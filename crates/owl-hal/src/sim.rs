//! In-process simulated collaborators for headless runs and tests.
//!
//! These drivers let the full control loop run without the owl, its camera
//! server or a terminal:
//!
//! - [`SimFrameSource`] renders synthetic stereo frames with a coloured blob
//!   orbiting the image centre, with optional scripted stalls and an
//!   optional frame limit after which the source reports itself gone.
//! - [`SimServoLink`] plays the servo controller: it parses every command,
//!   records it, and acknowledges with the same text (or fails on demand).
//! - [`ScriptedKeys`], [`ScriptedDetector`] and [`RecordingFeedback`] replay
//!   and record the operator side.
//!
//! # Example
//!
//! ```rust
//! use owl_hal::sim::SimServoLink;
//! use owl_hal::transport::ServoLink;
//!
//! let mut link = SimServoLink::new();
//! let log = link.log();
//! link.send("1535 1545 1520 1460 1540").expect("sim link must ack");
//! assert_eq!(log.commands().len(), 1);
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use owl_types::{ImagePoint, Key, Mode, OwlError, TargetObservation};
use parking_lot::Mutex;

use crate::camera::{Acquisition, FrameSource, RasterFrame, StereoFrame, StereoGeometry, split_stereo};
use crate::codec::decode_command;
use crate::detector::TargetDetector;
use crate::operator::{Feedback, FeedbackSink, KeySource};
use crate::transport::ServoLink;

// ────────────────────────────────────────────────────────────────────────────
// Frame source
// ────────────────────────────────────────────────────────────────────────────

/// Synthetic stereo camera.
pub struct SimFrameSource {
    geometry: StereoGeometry,
    blob_rgb: [u8; 3],
    blob_size: u32,
    produced: u64,
    calls: u64,
    stall_on: HashSet<u64>,
    frame_limit: Option<u64>,
}

impl SimFrameSource {
    /// A source producing frames of the given eye geometry with a green blob.
    pub fn new(geometry: StereoGeometry) -> Self {
        Self {
            geometry,
            blob_rgb: [20, 220, 40],
            blob_size: (geometry.eye_width / 16).max(2),
            produced: 0,
            calls: 0,
            stall_on: HashSet::new(),
            frame_limit: None,
        }
    }

    /// Report [`Acquisition::Stalled`] on the given (zero-based) acquire
    /// calls.
    pub fn with_stalls(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.stall_on.extend(calls);
        self
    }

    /// After `frames` frames, report the source as unavailable.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Render the combined (mirrored, side-by-side) frame for step `n`.
    fn render(&self, n: u64) -> RasterFrame {
        let (w, h) = (self.geometry.eye_width, self.geometry.eye_height);
        let mut frame = RasterFrame::blank(2 * w, h);
        let angle = n as f32 * 0.1;
        let cx = w as f32 / 2.0 + angle.cos() * w as f32 / 4.0;
        let cy = h as f32 / 2.0 + angle.sin() * h as f32 / 4.0;
        let half = self.blob_size as f32 / 2.0;
        for eye in 0..2u32 {
            for dy in 0..self.blob_size {
                for dx in 0..self.blob_size {
                    let x = (cx - half) as u32 + dx + eye * w;
                    let y = (cy - half) as u32 + dy;
                    let x = if self.geometry.flip_horizontal {
                        (2 * w - 1).saturating_sub(x)
                    } else {
                        x
                    };
                    frame.put_pixel(x, y, self.blob_rgb);
                }
            }
        }
        frame
    }
}

impl FrameSource for SimFrameSource {
    fn source_url(&self) -> &str {
        "sim://stereo"
    }

    fn acquire(&mut self, _timeout: Duration) -> Result<Acquisition, OwlError> {
        let call = self.calls;
        self.calls += 1;
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Err(OwlError::SourceUnavailable {
                source_url: self.source_url().to_string(),
                details: format!("simulated stream ended after {} frames", self.produced),
            });
        }
        if self.stall_on.contains(&call) {
            return Ok(Acquisition::Stalled);
        }
        let frame = self.render(self.produced);
        self.produced += 1;
        split_stereo(&frame, &self.geometry).map(Acquisition::Frame)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Servo link
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct LinkState {
    commands: Vec<String>,
    positions: Vec<[i32; 5]>,
    fail_on: HashSet<usize>,
    sends: usize,
    reply: Option<Vec<u8>>,
    closed: bool,
}

/// Shared view of everything a [`SimServoLink`] has received.
#[derive(Clone, Default)]
pub struct SimLinkLog(Arc<Mutex<LinkState>>);

impl SimLinkLog {
    /// Every command received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().commands.clone()
    }

    /// Every command received, parsed into wire-order positions.
    pub fn positions(&self) -> Vec<[i32; 5]> {
        self.0.lock().positions.clone()
    }

    pub fn last(&self) -> Option<String> {
        self.0.lock().commands.last().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.0.lock().closed
    }
}

/// Simulated servo controller.  Acknowledges each command by echoing it.
#[derive(Default)]
pub struct SimServoLink {
    state: SimLinkLog,
}

impl SimServoLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given (zero-based) send attempts with a transport error.
    pub fn failing_on(self, sends: impl IntoIterator<Item = usize>) -> Self {
        self.state.0.lock().fail_on.extend(sends);
        self
    }

    /// Reply with `reply` instead of echoing the command.
    pub fn replying(self, reply: &[u8]) -> Self {
        self.state.0.lock().reply = Some(reply.to_vec());
        self
    }

    /// Handle for inspecting received commands after the link has been
    /// boxed and handed to the control loop.
    pub fn log(&self) -> SimLinkLog {
        self.state.clone()
    }
}

impl ServoLink for SimServoLink {
    fn endpoint(&self) -> &str {
        "sim://controller"
    }

    fn send(&mut self, command: &str) -> Result<Vec<u8>, OwlError> {
        let mut state = self.state.0.lock();
        let attempt = state.sends;
        state.sends += 1;
        if state.closed || state.fail_on.contains(&attempt) {
            return Err(OwlError::TransportFailure {
                endpoint: "sim://controller".to_string(),
                details: format!("simulated failure on send {attempt}"),
            });
        }
        // The controller rejects anything but five integers.
        let positions = decode_command(command).map_err(|e| OwlError::TransportFailure {
            endpoint: "sim://controller".to_string(),
            details: format!("controller rejected command: {e}"),
        })?;
        state.commands.push(command.to_string());
        state.positions.push(positions);
        Ok(state
            .reply
            .clone()
            .unwrap_or_else(|| command.as_bytes().to_vec()))
    }

    fn close(&mut self) {
        self.state.0.lock().closed = true;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Operator side
// ────────────────────────────────────────────────────────────────────────────

/// Replays a fixed sequence of per-tick key events, then reports no keys.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    script: VecDeque<Option<Key>>,
}

impl ScriptedKeys {
    /// One entry per tick; `None` means no key on that tick.
    pub fn new(script: impl IntoIterator<Item = Option<Key>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Convenience: one character key per tick, `' '` meaning no key.
    pub fn from_chars(chars: &str) -> Self {
        Self::new(chars.chars().map(|c| (c != ' ').then_some(Key::Char(c))))
    }
}

impl KeySource for ScriptedKeys {
    fn poll_key(&mut self, _timeout: Duration) -> Option<Key> {
        self.script.pop_front().flatten()
    }
}

/// Detector that replays scripted observations, one per call, then reports
/// nothing found.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    script: VecDeque<TargetObservation>,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = TargetObservation>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// The same point seen by both eyes, `ticks` times.
    pub fn steady(point: ImagePoint, ticks: usize) -> Self {
        let obs = TargetObservation {
            right: Some(point),
            left: Some(point),
        };
        Self::new(std::iter::repeat_n(obs, ticks))
    }
}

impl TargetDetector for ScriptedDetector {
    fn locate(&mut self, _image: &RasterFrame) -> Option<ImagePoint> {
        None
    }

    fn observe(&mut self, _frame: &StereoFrame) -> TargetObservation {
        self.script.pop_front().unwrap_or_default()
    }
}

/// What a [`RecordingFeedback`] saw on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTick {
    pub tick: u64,
    pub mode: Mode,
    pub command: String,
    pub had_frame: bool,
    pub converged: bool,
    pub link_ok: bool,
}

#[derive(Default)]
struct RecordingState {
    ticks: Vec<RenderedTick>,
    closed: bool,
}

/// Shared view of a [`RecordingFeedback`].
#[derive(Clone, Default)]
pub struct FeedbackLog(Arc<Mutex<RecordingState>>);

impl FeedbackLog {
    pub fn ticks(&self) -> Vec<RenderedTick> {
        self.0.lock().ticks.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.0.lock().closed
    }
}

/// Feedback sink that records every rendered tick.
#[derive(Default)]
pub struct RecordingFeedback {
    log: FeedbackLog,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> FeedbackLog {
        self.log.clone()
    }
}

impl FeedbackSink for RecordingFeedback {
    fn render(&mut self, feedback: &Feedback<'_>) {
        self.log.0.lock().ticks.push(RenderedTick {
            tick: feedback.tick,
            mode: feedback.mode,
            command: feedback.command.to_string(),
            had_frame: feedback.frame.is_some(),
            converged: feedback.converged,
            link_ok: feedback.link_ok,
        });
    }

    fn close(&mut self) {
        self.log.0.lock().closed = true;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
