//! # Tuning recorder
//!
//! When tuning mode is enabled the controller records the error statistics of a fixed number of
//! samples, starting from the first sample at or above a threshold speed. Each recorded sample
//! produces a `TuningRecord`, and once the requested number of samples has been recorded a
//! `TuningSummary` is produced and the tuning run is complete.
//!
//! Records and summaries are handed to a `TuningSink`, which decides where they go.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// Internal
use super::Gains;
use util::{
    archive::{ArchiveError, Archiver},
    session::{SaveHandle, Session}
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Path of the per-sample archive, relative to the session archive root.
pub const RECORDS_ARCHIVE_PATH: &str = "tuning/records.csv";

/// Path of the summary report, relative to the session root.
pub const SUMMARY_PATH: &str = "tuning/summary.json";

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Destination for tuning diagnostics.
pub trait TuningSink {
    /// Called once per recorded sample.
    fn record(&mut self, record: &TuningRecord);

    /// Called once when the tuning run completes.
    fn summary(&mut self, summary: &TuningSummary);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Configuration of a tuning run.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TuningConfig {
    /// Number of samples to record before the run completes.
    pub max_samples: usize,

    /// Recording begins on the first sample at or above this speed.
    pub threshold_speed: f64
}

/// Diagnostics for a single recorded sample.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct TuningRecord {
    /// Zero based index of this sample within the run
    pub sample_index: usize,

    pub cte: f64,

    pub speed: f64,

    /// The derivative estimate used by the control law
    pub derivative: f64,

    /// The clamped steering output
    pub steer_value: f64,

    /// Mean squared CTE over the samples recorded before this one, `None` for the first sample.
    pub running_mse: Option<f64>
}

/// Final report of a tuning run.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct TuningSummary {
    pub num_samples: usize,

    /// Gains active on the final sample
    pub gains: Gains,

    /// Sum of squared CTE over all recorded samples
    pub sum_sq_error: f64,

    /// Mean squared CTE over all recorded samples
    pub mean_sq_error: Option<f64>
}

/// State of the recording latch.
///
/// The only transitions are `Idle -> Recording -> Complete`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
    Complete
}

/// Values from one control step which are of interest to the recorder.
#[derive(Debug, Copy, Clone)]
pub(crate) struct StepSample {
    pub cte: f64,
    pub speed: f64,
    pub derivative: f64,
    pub steer_value: f64,
    pub gains: Gains
}

/// The recorder embedded in the controller when tuning mode is enabled.
pub(crate) struct TuningRecorder {
    config: TuningConfig,
    state: RecordingState,
    sample_index: usize,
    sum_sq_error: f64,
    sink: Box<dyn TuningSink + Send>
}

/// Sink writing the diagnostics to the log, one line per sample.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogSink;

/// Sink which keeps everything in memory.
///
/// Clones share the same storage, so a clone can be kept to inspect what the controller
/// recorded.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    store: Arc<Mutex<MemoryStore>>
}

#[derive(Debug, Default)]
struct MemoryStore {
    records: Vec<TuningRecord>,
    summary: Option<TuningSummary>
}

/// Sink which archives the records as CSV and saves the summary as JSON in the session, as well
/// as writing them to the log.
pub struct ArchiveSink {
    archiver: Option<Archiver>,
    saver: SaveHandle,
    summary_path: PathBuf,
    log: LogSink
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            max_samples: 100,
            threshold_speed: 2.0
        }
    }
}

impl TuningRecorder {
    pub fn new(config: TuningConfig, sink: Box<dyn TuningSink + Send>) -> Self {
        Self {
            config,
            state: RecordingState::Idle,
            sample_index: 0,
            sum_sq_error: 0.0,
            sink
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    pub fn sum_sq_error(&self) -> f64 {
        self.sum_sq_error
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    /// Observe one control step, returning the summary if this sample completed the run.
    pub fn observe(&mut self, sample: &StepSample) -> Option<TuningSummary> {
        match self.state {
            RecordingState::Complete => return None,
            RecordingState::Idle if sample.speed >= self.config.threshold_speed => {
                self.state = RecordingState::Recording
            },
            RecordingState::Idle => return None,
            RecordingState::Recording => ()
        }

        self.sink.record(&TuningRecord {
            sample_index: self.sample_index,
            cte: sample.cte,
            speed: sample.speed,
            derivative: sample.derivative,
            steer_value: sample.steer_value,
            running_mse: mean(self.sum_sq_error, self.sample_index)
        });

        self.sum_sq_error += sample.cte * sample.cte;
        self.sample_index += 1;

        if self.sample_index < self.config.max_samples {
            return None
        }

        let summary = TuningSummary {
            num_samples: self.sample_index,
            gains: sample.gains,
            sum_sq_error: self.sum_sq_error,
            mean_sq_error: mean(self.sum_sq_error, self.sample_index)
        };

        self.state = RecordingState::Complete;
        self.sink.summary(&summary);

        Some(summary)
    }
}

impl TuningSink for LogSink {
    fn record(&mut self, record: &TuningRecord) {
        match record.running_mse {
            Some(mse) => info!(
                "{:5}  {:.6}, {:.6}, {:.6}, {:.6}",
                record.sample_index, record.cte, record.derivative, record.steer_value, mse
            ),
            None => info!(
                "{:5}  {:.6}, {:.6}, {:.6}, -",
                record.sample_index, record.cte, record.derivative, record.steer_value
            )
        }
    }

    fn summary(&mut self, summary: &TuningSummary) {
        info!("Tuning run complete");
        info!("    Samples: {}", summary.num_samples);
        info!("    Kp: {}", summary.gains.k_p);
        info!("    Ki: {}", summary.gains.k_i);
        info!("    Kd: {}", summary.gains.k_d);
        info!("    SSE: {}", summary.sum_sq_error);
        match summary.mean_sq_error {
            Some(mse) => info!("    MSE: {}", mse),
            None => info!("    MSE: -")
        }
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records received so far.
    pub fn records(&self) -> Vec<TuningRecord> {
        self.lock().records.clone()
    }

    /// The summary, if the run has completed.
    pub fn summary(&self) -> Option<TuningSummary> {
        self.lock().summary
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStore> {
        // A panic while holding the lock can't leave the store half written, so ignore poisoning
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TuningSink for MemorySink {
    fn record(&mut self, record: &TuningRecord) {
        self.lock().records.push(*record);
    }

    fn summary(&mut self, summary: &TuningSummary) {
        self.lock().summary = Some(*summary);
    }
}

impl ArchiveSink {
    /// Create the sink, opening the record archive in the session.
    pub fn new(session: &Session) -> Result<Self, ArchiveError> {
        Ok(Self {
            archiver: Some(Archiver::from_path(session, RECORDS_ARCHIVE_PATH)?),
            saver: session.save_handle(),
            summary_path: PathBuf::from(SUMMARY_PATH),
            log: LogSink
        })
    }
}

impl TuningSink for ArchiveSink {
    fn record(&mut self, record: &TuningRecord) {
        self.log.record(record);

        let failure = match self.archiver {
            Some(ref mut archiver) => archiver.serialise(record).err(),
            None => None
        };

        if let Some(e) = failure {
            warn!("Could not archive tuning record, archiving disabled: {}", e);
            self.archiver = None;
        }
    }

    fn summary(&mut self, summary: &TuningSummary) {
        self.log.summary(summary);
        self.saver.save(&self.summary_path, *summary);
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Mean of `sum` over `count` samples, `None` when there are no samples.
fn mean(sum: f64, count: usize) -> Option<f64> {
    if count == 0 {
        None
    }
    else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(cte: f64, speed: f64) -> StepSample {
        StepSample {
            cte,
            speed,
            derivative: 0.0,
            steer_value: 0.0,
            gains: Gains::new(0.1, 0.01, 0.2)
        }
    }

    #[test]
    fn test_mean_guard() {
        assert_eq!(mean(4.0, 0), None);
        assert_eq!(mean(4.0, 2), Some(2.0));
    }

    #[test]
    fn test_running_mse() {
        let sink = MemorySink::new();
        let mut recorder = TuningRecorder::new(
            TuningConfig { max_samples: 10, threshold_speed: 0.0 },
            Box::new(sink.clone())
        );

        recorder.observe(&sample(1.0, 5.0));
        recorder.observe(&sample(2.0, 5.0));
        recorder.observe(&sample(3.0, 5.0));

        let mses: Vec<_> = sink.records().iter().map(|r| r.running_mse).collect();
        assert_eq!(mses, vec![None, Some(1.0), Some(2.5)]);
        assert_eq!(recorder.sum_sq_error(), 14.0);
    }

    #[test]
    fn test_archive_sink() {
        // The only test in this crate which starts a session, as the epoch can only be set once
        let root = std::env::temp_dir().join(format!("steer_archive_sink_{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::env::set_var(util::host::SW_ROOT_ENV_VAR, &root);

        let session = Session::new("steer_exec_test", "sessions").unwrap();
        let records_path = session.arch_root.join(RECORDS_ARCHIVE_PATH);
        let summary_path = session.session_root.join(SUMMARY_PATH);

        let mut sink = ArchiveSink::new(&session).unwrap();
        sink.record(&TuningRecord {
            sample_index: 0,
            cte: 0.5,
            speed: 1.0,
            derivative: 5.0,
            steer_value: -0.6,
            running_mse: None
        });
        sink.record(&TuningRecord {
            sample_index: 1,
            cte: 0.5,
            speed: 1.0,
            derivative: 0.0,
            steer_value: -0.1,
            running_mse: Some(0.25)
        });

        let summary = TuningSummary {
            num_samples: 2,
            gains: Gains::new(0.2, 0.005, 0.1),
            sum_sq_error: 0.5,
            mean_sq_error: Some(0.25)
        };
        sink.summary(&summary);

        // Exiting waits for the save thread to write the summary
        session.exit();

        assert_eq!(
            std::fs::read_to_string(&records_path).unwrap(),
            "sample_index,cte,speed,derivative,steer_value,running_mse\n\
            0,0.5,1.0,5.0,-0.6,\n\
            1,0.5,1.0,0.0,-0.1,0.25\n"
        );

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&summary_path).unwrap()
        ).unwrap();
        assert_eq!(saved["num_samples"], 2);
        assert_eq!(saved["gains"]["k_p"], 0.2);
        assert_eq!(saved["gains"]["k_i"], 0.005);
        assert_eq!(saved["sum_sq_error"], 0.5);
        assert_eq!(saved["mean_sq_error"], 0.25);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_summary_json() {
        let summary = TuningSummary {
            num_samples: 2,
            gains: Gains::new(0.1, 0.01, 0.2),
            sum_sq_error: 0.5,
            mean_sq_error: Some(0.25)
        };

        assert_eq!(
            serde_json::to_string(&summary).unwrap(),
            "{\"num_samples\":2,\"gains\":{\"k_p\":0.1,\"k_i\":0.01,\"k_d\":0.2},\
            \"sum_sq_error\":0.5,\"mean_sq_error\":0.25}"
        );
    }

    #[test]
    fn test_zero_max_samples_completes_on_first_sample() {
        let sink = MemorySink::new();
        let mut recorder = TuningRecorder::new(
            TuningConfig { max_samples: 0, threshold_speed: 0.0 },
            Box::new(sink.clone())
        );

        let summary = recorder.observe(&sample(2.0, 1.0)).unwrap();
        assert_eq!(summary.num_samples, 1);
        assert_eq!(summary.mean_sq_error, Some(4.0));
        assert_eq!(recorder.state(), RecordingState::Complete);
        assert_eq!(recorder.observe(&sample(2.0, 1.0)), None);
        assert_eq!(sink.records().len(), 1);
    }
}
