//! # PID Controller
//!
//! Gain scheduled PID controller producing a normalised steering angle from the cross track
//! error, with an optional tuning mode which records error statistics over a fixed number of
//! samples.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod gains;
mod state;
mod tuning;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use gains::*;
pub use state::*;
pub use tuning::{
    ArchiveSink, LogSink, MemorySink, RecordingState, TuningConfig, TuningRecord, TuningSink,
    TuningSummary, RECORDS_ARCHIVE_PATH, SUMMARY_PATH
};

pub(crate) use tuning::{StepSample, TuningRecorder};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Sampling interval assumed by the derivative term when none is configured.
pub const DEFAULT_DELTA_T_S: f64 = 0.1;

/// Gains of a newly created controller.
pub const DEFAULT_GAINS: Gains = Gains::new(0.2, 0.005, 0.1);

/// Magnitude limit of the steering output.
pub const STEER_LIMIT: f64 = 1.0;
