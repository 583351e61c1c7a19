//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (start/cancel) for interactive front ends.
//! The TUI calls into it so that only the controller ever touches the runner.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};
