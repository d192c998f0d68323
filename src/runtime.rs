//! Runtime glue: configuration, terminal errors, fatal-error capture, progress
//! reporting, telemetry and the runner that wires both acquisition stages.

pub mod config;
pub mod error;
pub mod fatal;
pub mod progress;
pub mod runner;
pub mod telemetry;
