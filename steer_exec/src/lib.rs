//! # Steering library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to access items defined
//! inside the steering crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// PID controller - gain scheduled PID producing a steering angle from the cross track error
pub mod pid_ctrl;

/// Steering control module - turns simulator telemetry into steering commands
pub mod steer_ctrl;

/// Executable parameters
pub mod params;

/// Simulator server - accepts simulator connections and drives `steer_ctrl` from them
pub mod sim_server;
