//! `owl-types` – shared vocabulary of the owl head controller.
//!
//! Every other crate in the workspace speaks in these types:
//!
//! - [`axis`] – the five servo channels, their legal ranges and the
//!   [`AxisState`] that is clamped on every write.
//! - [`input`] – operator [`Mode`]s, raw [`Key`] events and the per-eye
//!   [`TargetObservation`] produced by the vision collaborator.
//! - [`error`] – [`OwlError`], the single error type used across the
//!   library crates.

pub mod axis;
pub mod error;
pub mod input;

pub use axis::{Axis, AxisLimits, AxisRange, AxisState};
pub use error::OwlError;
pub use input::{ImagePoint, Key, Mode, TargetObservation};
