//! # Communications interface crate.
//!
//! Provides the interfaces between the steering controller and the driving simulator.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Simulator telemetry and steering command messages, and their frame encoding
pub mod sim;

/// Network module
pub mod net;
