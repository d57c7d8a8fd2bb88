//! Runtime glue that wires options, the update protocol contract, telemetry,
//! and runner orchestration.

pub mod config;
pub mod protocol;
pub mod runner;
pub mod telemetry;
