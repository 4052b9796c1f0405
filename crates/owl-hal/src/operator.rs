//! Operator surface: key input and feedback rendering.

use std::time::Duration;

use owl_types::{Key, Mode, TargetObservation};

use crate::camera::StereoFrame;

/// Source of operator key events.
pub trait KeySource {
    /// Wait at most `timeout` for a key.  Returns `None` if none arrived.
    ///
    /// Implementations log and swallow their own read errors; a broken
    /// keyboard must not stop the head.
    fn poll_key(&mut self, timeout: Duration) -> Option<Key>;
}

/// Everything the loop knows at the end of a tick, handed to the feedback
/// sink for display.
#[derive(Debug, Clone, Copy)]
pub struct Feedback<'a> {
    pub tick: u64,
    pub mode: Mode,
    /// The wire command sent this tick.
    pub command: &'a str,
    /// `None` when acquisition stalled this tick.
    pub frame: Option<&'a StereoFrame>,
    pub observation: Option<&'a TargetObservation>,
    /// `true` once a converging behavior has reached its target.
    pub converged: bool,
    /// `false` if the command could not be delivered this tick.
    pub link_ok: bool,
}

/// Renders per-tick feedback to the operator.
pub trait FeedbackSink {
    fn render(&mut self, feedback: &Feedback<'_>);

    /// Tear down the display.  Called once when the loop exits.
    fn close(&mut self) {}
}
