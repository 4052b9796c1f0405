//! `owl-runtime` – the motion brain of the owl head.
//!
//! Turns operator keys and camera observations into a stream of five-axis
//! servo commands, one per tick.
//!
//! # Modules
//!
//! - [`behaviors`] – one [`Generator`][behaviors::Generator] per non-idle
//!   mode: neck and eye sweeps, colour tracking, eye rolls and point focus.
//! - [`mode_machine`] – [`ModeMachine`][mode_machine::ModeMachine]: the
//!   keymap, mode transitions, manual nudges and the cancel escape hatch.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the
//!   fixed-cadence acquire → key → generate → send → render cycle, with
//!   startup centring and cleanup on exit.
//! - [`stall_guard`] – [`StallGuard`][stall_guard::StallGuard]: tells a
//!   momentary video stall from a lost camera.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod behaviors;
pub mod control_loop;
pub mod mode_machine;
pub mod stall_guard;
pub mod telemetry;

pub use behaviors::{BehaviorSettings, Generator, Progress};
pub use control_loop::{ControlLoop, LoopSettings, Peripherals, RunSummary, TickOutcome};
pub use mode_machine::{Control, Keymap, MachineSettings, ModeMachine, Transition};
pub use stall_guard::StallGuard;
pub use telemetry::{LogFormat, LogSettings, TracerProviderGuard, init_tracing, init_tracing_with_writer};
