//! Implementations for the SteerCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use serde::Serialize;

// Internal
use super::{Params, SteerCtrlError};
use crate::pid_ctrl::{
    ArchiveSink, GainScheduledPid, Gains, LogSink, StepResult, TuningSink, TuningSummary
};
use comms_if::sim::{SteerCmd, Telemetry};
use util::{
    params,
    module::State,
    session::Session
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Steering control module state
#[derive(Default)]
pub struct SteerCtrl {

    pub(crate) params: Params,

    pid: GainScheduledPid,

    /// Number of telemetry samples processed, including warm up
    num_samples: usize
}

/// Initialisation data for SteerCtrl.
#[derive(Debug, Clone, Default)]
pub struct SteerCtrlInit {
    /// Parameter file path, relative to the params directory
    pub params_file: String,

    /// Base gains given on the command line, which take precedence over the parameter file
    pub gain_overrides: GainOverrides,

    /// Enable tuning mode regardless of the parameter file
    pub force_tuning: bool
}

/// Optional replacements for the base gains.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GainOverrides {
    pub k_p: Option<f64>,
    pub k_i: Option<f64>,
    pub k_d: Option<f64>
}

/// Status report for SteerCtrl processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusReport {
    /// Index of this sample since the module was initialised
    pub sample_number: usize,

    /// True if the controller was bypassed because the vehicle is still pulling away
    pub warming_up: bool,

    pub active_gains: Gains,

    /// Set on the sample which completed the tuning run
    pub tuning_summary: Option<TuningSummary>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SteerCtrl {
    /// Build the module directly from a set of parameters.
    ///
    /// The sink is only used if tuning is enabled in the parameters.
    pub fn from_params(
        params: Params,
        sink: Box<dyn TuningSink + Send>
    ) -> Result<Self, SteerCtrlError> {
        params.validate()?;

        let mut pid = GainScheduledPid::new();
        pid.init(params.base_gains.k_p, params.base_gains.k_i, params.base_gains.k_d);
        pid.set_delta_t(params.delta_t_s);

        for range in params.schedule.iter() {
            pid.add_schedule_entry(
                range.lower_speed,
                range.upper_speed,
                range.k_p,
                range.k_i,
                range.k_d
            );
        }

        if params.tuning.enabled {
            pid.enable_tuning(params.tuning_config(), sink);
        }

        Ok(Self {
            params,
            pid,
            num_samples: 0
        })
    }

    /// The underlying controller.
    pub fn pid(&self) -> &GainScheduledPid {
        &self.pid
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

impl GainOverrides {
    /// Apply the overrides on top of the given gains.
    pub fn apply(&self, gains: Gains) -> Gains {
        Gains {
            k_p: self.k_p.unwrap_or(gains.k_p),
            k_i: self.k_i.unwrap_or(gains.k_i),
            k_d: self.k_d.unwrap_or(gains.k_d)
        }
    }
}

impl State for SteerCtrl {
    const NAME: &'static str = "SteerCtrl";

    type InitData = SteerCtrlInit;
    type InitError = SteerCtrlError;

    type InputData = Telemetry;
    type OutputData = SteerCmd;
    type StatusReport = StatusReport;
    type ProcError = SteerCtrlError;

    /// Initialise the SteerCtrl module.
    ///
    /// Loads the parameter file and applies the command line overrides. In tuning mode the
    /// records are archived in the session if the parameters ask for it, otherwise they are
    /// only logged.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        let mut params: Params = params::load(&init_data.params_file)
            .map_err(SteerCtrlError::ParamLoadError)?;

        params.base_gains = init_data.gain_overrides.apply(params.base_gains);

        if init_data.force_tuning {
            params.tuning.enabled = true;
        }

        let sink: Box<dyn TuningSink + Send> = if params.tuning.enabled && params.tuning.archive {
            Box::new(ArchiveSink::new(session).map_err(SteerCtrlError::ArchiveInitError)?)
        }
        else {
            Box::new(LogSink)
        };

        info!(
            "{} base gains: Kp = {}, Ki = {}, Kd = {}",
            Self::NAME, params.base_gains.k_p, params.base_gains.k_i, params.base_gains.k_d
        );
        info!("{} schedule has {} bands", Self::NAME, params.schedule.len());

        if params.tuning.enabled {
            info!(
                "{} tuning enabled, recording {} samples from {} speed",
                Self::NAME, params.tuning.max_samples, params.tuning.threshold_speed_ms
            );
        }

        *self = Self::from_params(params, sink)?;

        Ok(())
    }

    /// Compute the steering command for one telemetry sample.
    ///
    /// Non-finite telemetry is rejected without touching the controller.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        if !input_data.cte.is_finite() {
            return Err(SteerCtrlError::InvalidTelemetry("cte"))
        }
        if !input_data.speed.is_finite() {
            return Err(SteerCtrlError::InvalidTelemetry("speed"))
        }

        let mut report = StatusReport {
            sample_number: self.num_samples,
            ..Default::default()
        };
        self.num_samples += 1;

        let steering_angle = if report.sample_number < self.params.warmup_samples {
            report.warming_up = true;
            0.0
        }
        else {
            let result = self.pid.compute_steering(input_data.cte, input_data.speed);

            if let StepResult::TuningComplete { summary, .. } = result {
                report.tuning_summary = Some(summary);
            }

            result.steer_value()
        };

        report.active_gains = self.pid.active_gains();

        debug!(
            "{} sample {}: cte = {:.4}, speed = {:.2}, steer = {:.4}",
            Self::NAME, report.sample_number, input_data.cte, input_data.speed, steering_angle
        );

        Ok((
            SteerCmd {
                steering_angle,
                throttle: self.params.throttle
            },
            report
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pid_ctrl::{MemorySink, RecordingState};

    fn telemetry(cte: f64, speed: f64) -> Telemetry {
        Telemetry {
            cte,
            speed,
            steering_angle: None,
            throttle: None
        }
    }

    fn tuning_params(max_samples: usize) -> Params {
        let mut params = Params::default();
        params.warmup_samples = 2;
        params.tuning.enabled = true;
        params.tuning.threshold_speed_ms = 30.0;
        params.tuning.max_samples = max_samples;
        params
    }

    #[test]
    fn test_warmup() {
        let mut ctrl = SteerCtrl::from_params(Params::default(), Box::new(LogSink)).unwrap();

        for i in 0..9 {
            let (cmd, report) = ctrl.proc(&telemetry(0.5, 5.0)).unwrap();
            assert_eq!(cmd.steering_angle, 0.0);
            assert_eq!(cmd.throttle, 0.3);
            assert_eq!(report.sample_number, i);
            assert!(report.warming_up);
        }

        // Controller state is untouched by the warm up
        assert_eq!(ctrl.pid().error_sum(), 0.0);

        let (cmd, report) = ctrl.proc(&telemetry(0.5, 5.0)).unwrap();
        assert!(!report.warming_up);
        assert_eq!(report.active_gains, Gains::new(0.6, 0.002, 0.25));
        assert!(cmd.steering_angle < 0.0);
        assert_eq!(ctrl.pid().error_sum(), 0.5);
    }

    #[test]
    fn test_tuning_run() {
        let sink = MemorySink::new();
        let mut ctrl = SteerCtrl::from_params(tuning_params(3), Box::new(sink.clone())).unwrap();

        // Warm up and below threshold samples are not recorded
        for _ in 0..3 {
            let (_, report) = ctrl.proc(&telemetry(0.1, 12.0)).unwrap();
            assert_eq!(report.tuning_summary, None);
        }
        assert_eq!(ctrl.pid().recording_state(), RecordingState::Idle);

        ctrl.proc(&telemetry(0.1, 35.0)).unwrap();
        assert_eq!(ctrl.pid().recording_state(), RecordingState::Recording);
        assert_eq!(sink.records().len(), 1);

        let (_, report) = ctrl.proc(&telemetry(0.2, 12.0)).unwrap();
        assert_eq!(report.tuning_summary, None);

        let (_, report) = ctrl.proc(&telemetry(0.3, 12.0)).unwrap();
        let summary = report.tuning_summary.unwrap();
        assert_eq!(summary.num_samples, 3);
        assert_eq!(summary.gains, Gains::new(0.4, 0.002, 0.2));
        assert_eq!(sink.summary(), Some(summary));
    }

    #[test]
    fn test_tuning_disabled() {
        let sink = MemorySink::new();
        let mut ctrl = SteerCtrl::from_params(Params::default(), Box::new(sink.clone())).unwrap();

        for _ in 0..20 {
            ctrl.proc(&telemetry(0.1, 35.0)).unwrap();
        }

        assert!(!ctrl.pid().is_tuning_enabled());
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_invalid_telemetry() {
        let mut ctrl = SteerCtrl::from_params(Params::default(), Box::new(LogSink)).unwrap();

        assert!(matches!(
            ctrl.proc(&telemetry(std::f64::NAN, 1.0)),
            Err(SteerCtrlError::InvalidTelemetry("cte"))
        ));
        assert!(matches!(
            ctrl.proc(&telemetry(0.0, std::f64::INFINITY)),
            Err(SteerCtrlError::InvalidTelemetry("speed"))
        ));
        assert_eq!(
            SteerCtrlError::InvalidTelemetry("cte").to_string(),
            "Received telemetry with a non-finite cte"
        );

        // Rejected samples don't count
        let (_, report) = ctrl.proc(&telemetry(0.0, 1.0)).unwrap();
        assert_eq!(report.sample_number, 0);
    }

    #[test]
    fn test_gain_overrides() {
        let overrides = GainOverrides {
            k_p: Some(0.5),
            k_i: None,
            k_d: Some(0.0)
        };

        assert_eq!(overrides.apply(Gains::new(0.2, 0.001, 0.1)), Gains::new(0.5, 0.001, 0.0));
        assert_eq!(GainOverrides::default().apply(Gains::new(1.0, 2.0, 3.0)), Gains::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_schedule_loaded() {
        let ctrl = SteerCtrl::from_params(Params::default(), Box::new(LogSink)).unwrap();

        assert_eq!(ctrl.pid().schedule().len(), 4);
        assert_eq!(ctrl.pid().base_gains(), Gains::new(0.2, 0.001, 0.1));
        assert_eq!(ctrl.pid().delta_t_s(), 0.1);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = Params::default();
        params.delta_t_s = -0.1;

        assert!(matches!(
            SteerCtrl::from_params(params, Box::new(LogSink)),
            Err(SteerCtrlError::InvalidParam(_))
        ));
    }
}
