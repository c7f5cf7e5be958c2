//! # Gain scheduled PID controller state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;

// Internal
use super::{
    GainRange, GainSchedule, Gains,
    RecordingState, StepSample, TuningConfig, TuningRecorder, TuningSink, TuningSummary,
    DEFAULT_DELTA_T_S, DEFAULT_GAINS, STEER_LIMIT
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID steering controller whose gains are selected from a speed schedule.
///
/// The control law is
///
/// ```text
/// steer = clamp(-k_p * cte - k_d * (cte - prev_cte) / dt - k_i * sum(cte), -1, 1)
/// ```
///
/// where `sum(cte)` covers all previous samples but not the current one. The integral is never
/// limited or decayed, so a long lasting bias will keep winding it up.
pub struct GainScheduledPid {
    /// Gains used when no schedule range matches the current speed
    base_gains: Gains,

    /// Gains used on the most recent step
    active_gains: Gains,

    schedule: GainSchedule,

    /// Sampling interval assumed by the derivative estimate
    delta_t_s: f64,

    /// CTE of the previous step
    prev_error: f64,

    /// Sum of the CTE of all previous steps
    error_sum: f64,

    /// Present only in tuning mode
    tuning: Option<TuningRecorder>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Result of one control step.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum StepResult {
    /// A steering value to apply.
    Steer(f64),

    /// A steering value to apply, and the tuning run finished on this step. The caller decides
    /// whether to stop driving.
    TuningComplete {
        steer_value: f64,
        summary: TuningSummary
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for GainScheduledPid {
    fn default() -> Self {
        Self {
            base_gains: DEFAULT_GAINS,
            active_gains: DEFAULT_GAINS,
            schedule: GainSchedule::new(),
            delta_t_s: DEFAULT_DELTA_T_S,
            prev_error: 0.0,
            error_sum: 0.0,
            tuning: None
        }
    }
}

impl GainScheduledPid {

    /// Create a new controller with the default gains, an empty schedule and tuning disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base gains, which are also made active.
    ///
    /// No checks are made on the sign or magnitude of the gains.
    pub fn init(&mut self, k_p: f64, k_i: f64, k_d: f64) {
        self.base_gains = Gains::new(k_p, k_i, k_d);
        self.active_gains = self.base_gains;
    }

    /// Append a speed range to the gain schedule.
    pub fn add_schedule_entry(
        &mut self,
        lower_speed: f64,
        upper_speed: f64,
        k_p: f64,
        k_i: f64,
        k_d: f64
    ) {
        self.schedule.push(GainRange::new(lower_speed, upper_speed, k_p, k_i, k_d));
    }

    /// Set the sampling interval used by the derivative estimate.
    pub fn set_delta_t(&mut self, delta_t_s: f64) {
        self.delta_t_s = delta_t_s;
    }

    /// Enable tuning mode, sending diagnostics to `sink`.
    ///
    /// Any previous tuning run is discarded.
    pub fn enable_tuning(&mut self, config: TuningConfig, sink: Box<dyn TuningSink + Send>) {
        self.tuning = Some(TuningRecorder::new(config, sink));
    }

    /// Calculate the steering value for the given cross track error and speed.
    ///
    /// Non-finite inputs are not rejected, they propagate through the law. Callers should
    /// validate their inputs first.
    pub fn compute_steering(&mut self, cte: f64, speed: f64) -> StepResult {
        self.select_gains(speed);

        let derivative = (cte - self.prev_error) / self.delta_t_s;

        let p = -self.active_gains.k_p * cte;
        let d = -self.active_gains.k_d * derivative;
        let i = -self.active_gains.k_i * self.error_sum;

        let steer_value = (p + d + i).clamp(-STEER_LIMIT, STEER_LIMIT);

        trace!(
            "cte: {:.4}, speed: {:.2}, p: {:.4}, i: {:.4}, d: {:.4}, steer: {:.4}",
            cte, speed, p, i, d, steer_value
        );

        let gains = self.active_gains;
        let summary = self.tuning.as_mut().and_then(|t| t.observe(&StepSample {
            cte,
            speed,
            derivative,
            steer_value,
            gains
        }));

        // Integral and derivative registers are always updated, even in tuning mode
        self.error_sum += cte;
        self.prev_error = cte;

        match summary {
            Some(summary) => StepResult::TuningComplete { steer_value, summary },
            None => StepResult::Steer(steer_value)
        }
    }

    /// Set the active gains for the given speed.
    fn select_gains(&mut self, speed: f64) {
        self.active_gains = match self.schedule.select(speed) {
            Some(range) => range.gains(),
            None => self.base_gains
        };
    }

    pub fn base_gains(&self) -> Gains {
        self.base_gains
    }

    pub fn active_gains(&self) -> Gains {
        self.active_gains
    }

    pub fn schedule(&self) -> &GainSchedule {
        &self.schedule
    }

    pub fn delta_t_s(&self) -> f64 {
        self.delta_t_s
    }

    pub fn prev_error(&self) -> f64 {
        self.prev_error
    }

    pub fn error_sum(&self) -> f64 {
        self.error_sum
    }

    pub fn is_tuning_enabled(&self) -> bool {
        self.tuning.is_some()
    }

    /// The configuration of the tuning run, if tuning is enabled.
    pub fn tuning_config(&self) -> Option<TuningConfig> {
        self.tuning.as_ref().map(|t| *t.config())
    }

    /// State of the recording latch. Always `Idle` when tuning is disabled.
    pub fn recording_state(&self) -> RecordingState {
        self.tuning
            .as_ref()
            .map(TuningRecorder::state)
            .unwrap_or(RecordingState::Idle)
    }

    /// Number of samples recorded in the current tuning run.
    pub fn sample_index(&self) -> usize {
        self.tuning.as_ref().map(TuningRecorder::sample_index).unwrap_or(0)
    }

    /// Sum of squared CTE over the recorded samples.
    pub fn total_error(&self) -> f64 {
        self.tuning.as_ref().map(TuningRecorder::sum_sq_error).unwrap_or(0.0)
    }
}

impl StepResult {
    /// The steering value, whether or not the tuning run completed.
    pub fn steer_value(&self) -> f64 {
        match *self {
            StepResult::Steer(s) => s,
            StepResult::TuningComplete { steer_value, .. } => steer_value
        }
    }

    pub fn is_tuning_complete(&self) -> bool {
        matches!(self, StepResult::TuningComplete { .. })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pid_ctrl::MemorySink;

    const TOL: f64 = 1e-12;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < TOL, "Expected {}, got {}", b, a);
    }

    fn tuning_pid(max_samples: usize, threshold_speed: f64) -> (GainScheduledPid, MemorySink) {
        let sink = MemorySink::new();
        let mut pid = GainScheduledPid::new();
        pid.init(0.1, 0.001, 0.05);
        pid.enable_tuning(
            TuningConfig { max_samples, threshold_speed },
            Box::new(sink.clone())
        );
        (pid, sink)
    }

    #[test]
    fn test_example_step() {
        let mut pid = GainScheduledPid::new();
        pid.init(0.2, 0.005, 0.1);

        // -0.2 * 0.5 - 0.1 * (0.5 - 0) / 0.1 - 0.005 * 0
        let out = pid.compute_steering(0.5, 15.0);
        assert_eq!(out, StepResult::Steer(out.steer_value()));
        assert_close(out.steer_value(), -0.6);
    }

    #[test]
    fn test_clamping() {
        let mut pid = GainScheduledPid::new();
        pid.init(0.2, 0.005, 0.1);
        pid.add_schedule_entry(0.0, 10.0, 50.0, 5.0, 10.0);

        for &cte in &[1e9, -1e9, 3.0, -3.0, 0.0, 1e-3, 250.0, -0.75] {
            for &speed in &[-5.0, 0.0, 5.0, 15.0, 1e6] {
                let s = pid.compute_steering(cte, speed).steer_value();
                assert!(s >= -1.0 && s <= 1.0, "Steer {} out of range", s);
            }
        }

        let mut pid = GainScheduledPid::new();
        pid.init(1.0, 0.0, 0.0);
        assert_eq!(pid.compute_steering(5.0, 0.0).steer_value(), -1.0);
        assert_eq!(pid.compute_steering(-5.0, 0.0).steer_value(), 1.0);
    }

    #[test]
    fn test_schedule_first_match() {
        let mut pid = GainScheduledPid::new();
        pid.init(0.2, 0.001, 0.1);
        pid.add_schedule_entry(10.0, 30.0, 0.4, 0.002, 0.2);
        pid.add_schedule_entry(15.0, 25.0, 0.9, 0.009, 0.9);

        pid.compute_steering(0.0, 20.0);
        assert_eq!(pid.active_gains(), Gains::new(0.4, 0.002, 0.2));
    }

    #[test]
    fn test_schedule_boundaries() {
        let mut pid = GainScheduledPid::new();
        pid.init(0.2, 0.001, 0.1);
        pid.add_schedule_entry(10.0, 20.0, 0.4, 0.002, 0.2);
        pid.add_schedule_entry(20.0, 30.0, 0.3, 0.003, 0.3);

        pid.compute_steering(0.0, 10.0);
        assert_eq!(pid.active_gains(), Gains::new(0.4, 0.002, 0.2));

        pid.compute_steering(0.0, 20.0);
        assert_eq!(pid.active_gains(), Gains::new(0.3, 0.003, 0.3));

        pid.compute_steering(0.0, 30.0);
        assert_eq!(pid.active_gains(), pid.base_gains());
    }

    #[test]
    fn test_fallback_to_base_gains() {
        let mut pid = GainScheduledPid::new();
        pid.init(0.3, 0.01, 0.02);
        pid.add_schedule_entry(0.0, 10.0, 5.0, 5.0, 5.0);

        pid.compute_steering(0.2, 50.0);
        let out = pid.compute_steering(0.4, 50.0).steer_value();

        let expected = -0.3 * 0.4 - 0.02 * (0.4 - 0.2) / DEFAULT_DELTA_T_S - 0.01 * 0.2;
        assert_close(out, expected);
        assert_eq!(pid.active_gains(), pid.base_gains());
    }

    #[test]
    fn test_state_persists_between_calls() {
        let mut pid = GainScheduledPid::new();
        pid.init(0.1, 0.1, 0.0);

        pid.compute_steering(1.0, 0.0);
        pid.compute_steering(1.0, 0.0);
        assert_close(pid.error_sum(), 2.0);
        assert_close(pid.prev_error(), 1.0);

        let third = pid.compute_steering(1.0, 0.0).steer_value();
        assert_close(third, -0.1 - 0.1 * 2.0);

        let mut fresh = GainScheduledPid::new();
        fresh.init(0.1, 0.1, 0.0);
        assert!((fresh.compute_steering(1.0, 0.0).steer_value() - third).abs() > 0.1);
    }

    #[test]
    fn test_integral_not_limited() {
        let mut pid = GainScheduledPid::new();
        pid.init(0.0, 0.001, 0.0);

        for _ in 0..10_000 {
            pid.compute_steering(1.0, 0.0);
        }

        // The output saturates but the integral keeps growing
        assert_close(pid.error_sum(), 10_000.0);
        assert_eq!(pid.compute_steering(1.0, 0.0).steer_value(), -1.0);
    }

    #[test]
    fn test_delta_t() {
        let mut pid = GainScheduledPid::new();
        pid.init(0.0, 0.0, 0.01);
        pid.set_delta_t(0.05);

        assert_close(pid.compute_steering(0.5, 0.0).steer_value(), -0.01 * 0.5 / 0.05);
    }

    #[test]
    fn test_init_overwrites() {
        let mut pid = GainScheduledPid::new();
        assert_eq!(pid.base_gains(), DEFAULT_GAINS);

        pid.init(1.0, 2.0, 3.0);
        pid.init(-0.1, 0.0, 0.2);
        assert_eq!(pid.base_gains(), Gains::new(-0.1, 0.0, 0.2));
        assert_eq!(pid.active_gains(), Gains::new(-0.1, 0.0, 0.2));
    }

    #[test]
    fn test_nan_propagates() {
        let mut pid = GainScheduledPid::new();
        assert!(pid.compute_steering(std::f64::NAN, 10.0).steer_value().is_nan());
        assert!(pid.error_sum().is_nan());
    }

    #[test]
    fn test_no_recording_without_tuning() {
        let mut pid = GainScheduledPid::new();

        for _ in 0..5 {
            assert!(!pid.compute_steering(0.3, 100.0).is_tuning_complete());
        }

        assert!(!pid.is_tuning_enabled());
        assert_eq!(pid.recording_state(), RecordingState::Idle);
        assert_eq!(pid.sample_index(), 0);
        assert_eq!(pid.total_error(), 0.0);
    }

    #[test]
    fn test_recording_latch() {
        let (mut pid, sink) = tuning_pid(100, 10.0);

        pid.compute_steering(0.1, 5.0);
        assert_eq!(pid.recording_state(), RecordingState::Idle);
        assert_eq!(pid.sample_index(), 0);

        pid.compute_steering(0.2, 12.0);
        assert_eq!(pid.recording_state(), RecordingState::Recording);
        assert_eq!(pid.sample_index(), 1);

        // Below threshold, but the latch holds
        pid.compute_steering(0.3, 3.0);
        assert_eq!(pid.recording_state(), RecordingState::Recording);
        assert_eq!(pid.sample_index(), 2);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sample_index, 0);
        assert_eq!(records[0].cte, 0.2);
        assert_eq!(records[0].running_mse, None);
        assert_eq!(records[1].sample_index, 1);
        assert_eq!(records[1].speed, 3.0);
        assert_close(records[1].running_mse.unwrap(), 0.04);
        assert_close(records[1].derivative, (0.3 - 0.2) / DEFAULT_DELTA_T_S);
    }

    #[test]
    fn test_tuning_completes() {
        let (mut pid, sink) = tuning_pid(3, 0.0);
        pid.add_schedule_entry(0.0, 50.0, 0.12, 0.01, 0.1);

        assert!(!pid.compute_steering(0.5, 35.0).is_tuning_complete());
        assert!(!pid.compute_steering(-0.5, 35.0).is_tuning_complete());

        let summary = match pid.compute_steering(1.0, 35.0) {
            StepResult::TuningComplete { summary, .. } => summary,
            r => panic!("Expected the tuning run to complete, got {:?}", r)
        };

        assert_eq!(summary.num_samples, 3);
        assert_eq!(summary.gains, pid.active_gains());
        assert_eq!(summary.gains, Gains::new(0.12, 0.01, 0.1));
        assert_close(summary.sum_sq_error, 1.5);
        assert_close(summary.mean_sq_error.unwrap(), 0.5);
        assert_eq!(sink.summary(), Some(summary));
        assert_eq!(pid.recording_state(), RecordingState::Complete);

        // Control continues after the run, without further recording
        let after = pid.compute_steering(0.2, 35.0);
        assert!(!after.is_tuning_complete());
        assert_eq!(sink.records().len(), 3);
        assert_close(pid.error_sum(), 1.2);
    }
}
