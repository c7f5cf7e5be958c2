//! # PID Controller Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use steer_lib::pid_ctrl::{
    GainScheduledPid, TuningConfig, TuningRecord, TuningSink, TuningSummary
};
use steer_lib::steer_ctrl::Params;

/// Sink that throws everything away, so only the recorder bookkeeping is measured.
struct NullSink;

impl TuningSink for NullSink {
    fn record(&mut self, _record: &TuningRecord) {}
    fn summary(&mut self, _summary: &TuningSummary) {}
}

/// Controller with the shipped gain schedule.
fn scheduled_pid() -> GainScheduledPid {
    let params = Params::default();
    let mut pid = GainScheduledPid::new();

    pid.init(params.base_gains.k_p, params.base_gains.k_i, params.base_gains.k_d);
    for r in params.schedule.iter() {
        pid.add_schedule_entry(r.lower_speed, r.upper_speed, r.k_p, r.k_i, r.k_d);
    }

    pid
}

fn pid_ctrl_benchmark(c: &mut Criterion) {
    // Sweep the speed so every band and the fallback are exercised
    let samples: Vec<(f64, f64)> = (0..100)
        .map(|i| {
            let t = i as f64 * 0.1;
            (0.8 * t.sin(), 0.5 * i as f64)
        })
        .collect();

    let mut pid = scheduled_pid();

    c.bench_function("GainScheduledPid::compute_steering", |b| {
        b.iter(|| {
            for &(cte, speed) in samples.iter() {
                black_box(pid.compute_steering(black_box(cte), black_box(speed)));
            }
        })
    });

    let mut pid = scheduled_pid();
    pid.enable_tuning(
        TuningConfig {
            max_samples: usize::MAX,
            threshold_speed: 0.0
        },
        Box::new(NullSink)
    );

    c.bench_function("GainScheduledPid::compute_steering::tuning", |b| {
        b.iter(|| {
            for &(cte, speed) in samples.iter() {
                black_box(pid.compute_steering(black_box(cte), black_box(speed)));
            }
        })
    });
}

criterion_group!(benches, pid_ctrl_benchmark);
criterion_main!(benches);
