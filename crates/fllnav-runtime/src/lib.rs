//! `fllnav-runtime` – navigation orchestration.
//!
//! # Modules
//!
//! - [`navigator`] – [`Navigator`][navigator::Navigator]: waypoint following,
//!   both as blocking turn-then-drive moves and as a single-tick closed-loop
//!   controller, plus conversion of recorded drive sessions to waypoints.
//! - [`cadence`] – [`Cadence`][cadence::Cadence]: paces the periodic
//!   estimator tasks against the robot clock.
//! - [`runner`] – [`Runner`][runner::Runner]: owns the hardware, the
//!   estimators and the planner; runs navigate / follow / calibrate
//!   operations with cooperative cancellation and dispatches
//!   [`Command`][fllnav_types::Command] messages.
//! - [`config`] – [`NavConfig`][config::NavConfig]: every tunable, grouped by
//!   component, with validation.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod cadence;
pub mod config;
pub mod navigator;
pub mod runner;
pub mod telemetry;

pub use config::{FieldConfig, NavConfig};
pub use navigator::{DriveCommand, NavStep, Navigator, NavigatorConfig};
pub use runner::{Runner, RunnerConfig, RunnerState, blend_pose};
pub use telemetry::{TracerProviderGuard, init_tracing};
