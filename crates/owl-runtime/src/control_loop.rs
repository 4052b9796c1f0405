//! [`ControlLoop`] – the fixed-cadence tick that drives the head.
//!
//! Each tick, strictly in this order:
//!
//! 1. **Acquire** – wait up to one frame interval for a stereo pair.  A stall
//!    is transient; too many in a row is fatal.
//! 2. **Key** – poll the operator for at most the rest of the interval.
//! 3. **Mode** – feed the key to the [`ModeMachine`].
//! 4. **Detect** – in ColorTrack, and only on a real frame, locate the target.
//! 5. **Generate** – step the active behavior.
//! 6. **Send** – encode the whole [`AxisState`] and send it; decode the ack.
//! 7. **Render** – hand the tick's results to the feedback sink.
//!
//! The command of a tick is always encoded after every mutation of that tick,
//! so the controller never sees a half-updated pose.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! use owl_hal::StereoGeometry;
//! use owl_hal::sim::{RecordingFeedback, ScriptedDetector, ScriptedKeys, SimFrameSource, SimServoLink};
//! use owl_runtime::control_loop::{ControlLoop, LoopSettings, Peripherals};
//!
//! let link = SimServoLink::new();
//! let sent = link.log();
//! let io = Peripherals {
//!     source: Box::new(SimFrameSource::new(StereoGeometry { eye_width: 32, eye_height: 24, flip_horizontal: true })),
//!     keys: Box::new(ScriptedKeys::from_chars("n")),
//!     link: Box::new(link),
//!     detector: Box::new(ScriptedDetector::default()),
//!     feedback: Box::new(RecordingFeedback::new()),
//! };
//! let settings = LoopSettings {
//!     frame_interval: Duration::ZERO,
//!     max_ticks: Some(10),
//!     ..LoopSettings::default()
//! };
//! let mut owl = ControlLoop::new(settings, io).unwrap();
//! let summary = owl.run(&AtomicBool::new(false)).unwrap();
//! assert_eq!(summary.ticks, 10);
//! assert!(sent.is_closed());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use owl_hal::{
    Acquisition, Feedback, FeedbackSink, FrameSource, KeySource, ServoLink, TargetDetector,
    decode_ack, encode,
};
use owl_types::{AxisLimits, AxisState, Key, Mode, OwlError};
use tracing::{debug, error, info, info_span, warn};

use crate::behaviors::Progress;
use crate::mode_machine::{MachineSettings, ModeMachine, Transition};
use crate::stall_guard::StallGuard;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`ControlLoop`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Target tick period.  Also the wait budget for a frame.
    pub frame_interval: Duration,
    /// Consecutive stalled ticks tolerated before the source counts as gone.
    pub max_stalled_frames: u32,
    /// Stop cleanly after this many ticks.  `None` runs until stopped.
    pub max_ticks: Option<u64>,
    pub limits: AxisLimits,
    pub machine: MachineSettings,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(50),
            max_stalled_frames: 40,
            max_ticks: None,
            limits: AxisLimits::default(),
            machine: MachineSettings::default(),
        }
    }
}

/// The external collaborators the loop talks to.
pub struct Peripherals {
    pub source: Box<dyn FrameSource>,
    pub keys: Box<dyn KeySource>,
    pub link: Box<dyn ServoLink>,
    pub detector: Box<dyn TargetDetector>,
    pub feedback: Box<dyn FeedbackSink>,
}

/// What the caller should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The operator pressed Ctrl-C in the terminal.
    Stop,
}

/// Counters and final state of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub stalls: u64,
    pub transport_failures: u64,
    pub malformed_acks: u64,
    pub final_mode: Mode,
    /// The last command sent (the one sent during cleanup).
    pub final_command: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the head's pose, the mode machine and every collaborator.
pub struct ControlLoop {
    settings: LoopSettings,
    axes: AxisState,
    machine: ModeMachine,
    io: Peripherals,
    stalls: StallGuard,
    ticks: u64,
    transport_failures: u64,
    malformed_acks: u64,
    converged: bool,
    last_command: String,
}

impl ControlLoop {
    /// # Errors
    ///
    /// Returns [`OwlError::InvalidConfig`] if the axis limits are
    /// inconsistent.
    pub fn new(settings: LoopSettings, io: Peripherals) -> Result<Self, OwlError> {
        let axes = AxisState::new(settings.limits)?;
        let machine = ModeMachine::new(settings.machine.clone());
        let stalls = StallGuard::new(settings.max_stalled_frames);
        Ok(Self {
            settings,
            axes,
            machine,
            io,
            stalls,
            ticks: 0,
            transport_failures: 0,
            malformed_acks: 0,
            converged: false,
            last_command: String::new(),
        })
    }

    pub fn axes(&self) -> &AxisState {
        &self.axes
    }

    pub fn mode(&self) -> Mode {
        self.machine.mode()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            ticks: self.ticks,
            stalls: self.stalls.total(),
            transport_failures: self.transport_failures,
            malformed_acks: self.malformed_acks,
            final_mode: self.machine.mode(),
            final_command: self.last_command.clone(),
        }
    }

    /// Centre every axis and send that pose once.
    pub fn start(&mut self) {
        info!(
            source = self.io.source.source_url(),
            controller = self.io.link.endpoint(),
            "owl control loop starting"
        );
        self.axes.center_all();
        self.transmit();
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Returns [`OwlError::SourceUnavailable`] when the video source is gone,
    /// either reported by the source itself or after too many stalls in a
    /// row.  Transport failures are never returned.
    pub fn tick(&mut self) -> Result<TickOutcome, OwlError> {
        let n = self.ticks + 1;
        let span = info_span!("tick", n, mode = %self.machine.mode());
        let _enter = span.enter();

        let started = Instant::now();
        let interval = self.settings.frame_interval;

        // ── Acquire ──────────────────────────────────────────────────────────
        let frame = match self.io.source.acquire(interval) {
            Ok(Acquisition::Frame(pair)) => {
                self.stalls.record_frame();
                Some(pair)
            }
            Ok(Acquisition::Stalled) => {
                if self.stalls.record_stall() {
                    let err = OwlError::SourceUnavailable {
                        source_url: self.io.source.source_url().to_string(),
                        details: format!("no frame for {} consecutive ticks", self.stalls.streak()),
                    };
                    error!(error = %err, "video source lost");
                    return Err(err);
                }
                warn!(streak = self.stalls.streak(), "frame stalled");
                None
            }
            Err(e) => {
                error!(error = %e, "video source lost");
                return Err(e);
            }
        };

        // ── Key and mode ─────────────────────────────────────────────────────
        let key = self.io.keys.poll_key(interval.saturating_sub(started.elapsed()));
        if key == Some(Key::Interrupt) {
            info!("interrupt key pressed");
            return Ok(TickOutcome::Stop);
        }
        if matches!(
            self.machine.apply_key(key, &mut self.axes),
            Transition::Entered(_) | Transition::Cancelled
        ) {
            self.converged = false;
        }

        // ── Detect and generate ──────────────────────────────────────────────
        let observation = match &frame {
            Some(pair) if self.machine.mode().needs_target() => Some(self.io.detector.observe(pair)),
            _ => None,
        };
        if let Some(progress) = self.machine.tick(&mut self.axes, observation.as_ref()) {
            let converged = progress == Progress::Converged;
            if converged && !self.converged {
                info!(mode = %self.machine.mode(), "behavior converged");
            }
            self.converged = converged;
        }

        // ── Send and render ──────────────────────────────────────────────────
        let link_ok = self.transmit();
        self.io.feedback.render(&Feedback {
            tick: n,
            mode: self.machine.mode(),
            command: &self.last_command,
            frame: frame.as_ref(),
            observation: observation.as_ref(),
            converged: self.converged,
            link_ok,
        });
        self.ticks = n;

        let elapsed = started.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
        Ok(TickOutcome::Continue)
    }

    /// Start, tick until stopped, then clean up.
    ///
    /// The loop ends when `stop` is set, when the operator presses Ctrl-C in
    /// the terminal, after `max_ticks`, or on a fatal source error.  Cleanup
    /// (final command, closing the link and the display) runs in every case.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`OwlError`] that ended the loop, after cleanup.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<RunSummary, OwlError> {
        self.start();
        let result = loop {
            if stop.load(Ordering::SeqCst) {
                info!("stop requested");
                break Ok(());
            }
            if self.settings.max_ticks.is_some_and(|max| self.ticks >= max) {
                break Ok(());
            }
            match self.tick() {
                Ok(TickOutcome::Continue) => {}
                Ok(TickOutcome::Stop) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.shutdown();
        result.map(|()| self.summary())
    }

    fn shutdown(&mut self) {
        self.transmit();
        self.io.link.close();
        self.io.feedback.close();
        let summary = self.summary();
        info!(
            ticks = summary.ticks,
            stalls = summary.stalls,
            transport_failures = summary.transport_failures,
            malformed_acks = summary.malformed_acks,
            "owl control loop stopped"
        );
    }

    /// Encode and send the current pose.  Returns `false` if it was not
    /// delivered.
    fn transmit(&mut self) -> bool {
        let command = encode(&self.axes);
        debug!(%command, "send");
        let delivered = match self.io.link.send(&command) {
            Ok(reply) => {
                match decode_ack(&reply) {
                    Ok(ack) => debug!(ack = %ack.0, "ack"),
                    Err(e) => {
                        self.malformed_acks += 1;
                        warn!(error = %e, "malformed ack");
                    }
                }
                true
            }
            Err(e) => {
                self.transport_failures += 1;
                warn!(endpoint = self.io.link.endpoint(), error = %e, "command not delivered");
                false
            }
        };
        self.last_command = command;
        delivered
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
