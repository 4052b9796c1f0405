//! `owl-hal` – collaborators at the edge of the control loop.
//!
//! The runtime only ever talks to the traits defined here, so the video
//! feed, the servo controller link, the target detector and the operator
//! surface can be swapped (real hardware, simulation, test doubles) without
//! touching mode or behavior logic.
//!
//! # Modules
//!
//! - [`camera`] – [`FrameSource`][camera::FrameSource], raster frames and the
//!   stereo split of the combined side-by-side image.
//! - [`mjpeg`] – [`MjpegSource`][mjpeg::MjpegSource], an HTTP MJPEG stream
//!   reader.
//! - [`codec`] – the five-integer wire command and acknowledgement decoding.
//! - [`transport`] – [`ServoLink`][transport::ServoLink] with UDP and TCP
//!   implementations.
//! - [`detector`] – [`TargetDetector`][detector::TargetDetector] and an HSV
//!   colour-blob implementation.
//! - [`operator`] – [`KeySource`][operator::KeySource] and
//!   [`FeedbackSink`][operator::FeedbackSink].
//! - [`sim`] – in-process drivers for headless runs and tests.

pub mod camera;
pub mod codec;
pub mod detector;
pub mod mjpeg;
pub mod operator;
pub mod sim;
pub mod transport;

pub use camera::{Acquisition, FrameSource, RasterFrame, StereoFrame, StereoGeometry, split_stereo};
pub use codec::{Ack, decode_ack, decode_command, encode};
pub use detector::{ColorBlobDetector, DetectorSettings, TargetDetector};
pub use mjpeg::MjpegSource;
pub use operator::{Feedback, FeedbackSink, KeySource};
pub use transport::{ServoLink, TcpServoLink, UdpServoLink};
