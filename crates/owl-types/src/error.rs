use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type spanning video loss, controller link faults, malformed
/// acknowledgements and bad configuration.
///
/// Out-of-range positions and unknown keys are not errors: the former are
/// clamped by [`AxisState`][crate::AxisState], the latter are ignored.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwlError {
    /// The video stream could not be opened or stopped delivering frames.
    /// Fatal for the control loop.
    #[error("Video source {source_url} unavailable: {details}")]
    SourceUnavailable { source_url: String, details: String },

    /// Sending a command to (or reading the reply from) the servo controller
    /// failed.  Recoverable: the loop retransmits on the next tick.
    #[error("Transport failure talking to {endpoint}: {details}")]
    TransportFailure { endpoint: String, details: String },

    /// The controller replied with something that is not an acknowledgement.
    #[error("Malformed controller response: {0}")]
    MalformedResponse(String),

    /// A frame did not have the geometry required for the stereo split.
    #[error("Frame geometry error: {0}")]
    FrameGeometry(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OwlError {
    /// `true` for errors after which the control loop must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OwlError::SourceUnavailable { .. } | OwlError::InvalidConfig(_))
    }
}
