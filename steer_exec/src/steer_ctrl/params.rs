//! Parameters structure for SteerCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use serde::Deserialize;

use super::SteerCtrlError;
use crate::pid_ctrl::{GainRange, Gains, TuningConfig, DEFAULT_DELTA_T_S};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Steering control.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Params {

    // ---- CONTROLLER ----

    /// Gains used outside of any scheduled speed band.
    pub base_gains: Gains,

    /// Sampling interval assumed by the derivative term.
    ///
    /// Units: seconds
    #[serde(default = "default_delta_t_s")]
    pub delta_t_s: f64,

    /// Speed banded gains, searched in order.
    #[serde(default)]
    pub schedule: Vec<GainRange>,

    // ---- COMMAND ----

    /// Constant throttle demand sent with every steering command.
    pub throttle: f64,

    /// Number of telemetry samples answered with zero steering before the controller is run.
    ///
    /// The simulator reports unreliable speeds while the vehicle pulls away.
    #[serde(default = "default_warmup_samples")]
    pub warmup_samples: usize,

    // ---- TUNING ----

    #[serde(default)]
    pub tuning: TuningParams
}

/// Parameters for tuning mode.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TuningParams {
    /// Enable tuning mode.
    pub enabled: bool,

    /// Archive the tuning records and summary in the session as well as logging them.
    pub archive: bool,

    /// Recording starts at the first sample at or above this speed.
    ///
    /// Units: simulator speed units
    pub threshold_speed_ms: f64,

    /// Number of samples recorded before the tuning run completes.
    pub max_samples: usize
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            base_gains: Gains::new(0.2, 0.001, 0.1),
            delta_t_s: DEFAULT_DELTA_T_S,
            schedule: vec![
                GainRange::new(-1000.0, 10.0, 0.6, 0.002, 0.25),
                GainRange::new(10.0, 20.0, 0.4, 0.002, 0.2),
                GainRange::new(20.0, 30.0, 0.2, 0.01, 0.15),
                GainRange::new(30.0, 40.0, 0.12, 0.01, 0.10),
            ],
            throttle: 0.3,
            warmup_samples: default_warmup_samples(),
            tuning: TuningParams::default()
        }
    }
}

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            enabled: false,
            archive: true,
            threshold_speed_ms: 30.0,
            max_samples: 1000
        }
    }
}

impl Params {
    /// Check the parameters are usable.
    ///
    /// Inverted schedule bands are accepted but reported, since they can never match.
    pub fn validate(&self) -> Result<(), SteerCtrlError> {
        if !(self.delta_t_s.is_finite() && self.delta_t_s > 0.0) {
            return Err(SteerCtrlError::InvalidParam(format!(
                "delta_t_s must be positive, found {}", self.delta_t_s
            )))
        }

        if !self.throttle.is_finite() {
            return Err(SteerCtrlError::InvalidParam(format!(
                "throttle must be finite, found {}", self.throttle
            )))
        }

        if self.tuning.max_samples == 0 {
            return Err(SteerCtrlError::InvalidParam(
                "tuning.max_samples must be at least 1".into()
            ))
        }

        for (i, range) in self.schedule.iter().enumerate() {
            if range.lower_speed >= range.upper_speed {
                warn!(
                    "Schedule band {} [{}, {}) is empty and will never be selected",
                    i, range.lower_speed, range.upper_speed
                );
            }
        }

        Ok(())
    }

    /// Configuration of the tuning run described by these parameters.
    pub fn tuning_config(&self) -> TuningConfig {
        TuningConfig {
            max_samples: self.tuning.max_samples,
            threshold_speed: self.tuning.threshold_speed_ms
        }
    }
}

fn default_delta_t_s() -> f64 {
    DEFAULT_DELTA_T_S
}

fn default_warmup_samples() -> usize {
    9
}
