//! Steering control module
//!
//! Wraps the gain scheduled PID controller as a cyclic processing module, turning each telemetry
//! sample from the simulator into a steering command.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during SteerCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum SteerCtrlError {
    #[error("Could not load the SteerCtrl parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid SteerCtrl parameter: {0}")]
    InvalidParam(String),

    #[error("Could not open the tuning archive: {0}")]
    ArchiveInitError(util::archive::ArchiveError),

    #[error("Received telemetry with a non-finite {0}")]
    InvalidTelemetry(&'static str)
}
