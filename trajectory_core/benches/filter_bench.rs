use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sensor_models::{units::mps_to_mph, EgoSample, RadarReturn, SensorDirection};
use trajectory_core::{
    projection::CoordinateProjector,
    types::{EgoState, TargetIdAllocator, TripId},
    EgoStateEstimator, ReconstructionConfig, RunDirection, TripInput, TripProcessor,
};

const DT: f64 = 0.1;

fn make_ego(n: usize) -> Vec<EgoSample> {
    (0..n)
        .map(|k| {
            let t = k as f64 * DT;
            EgoSample {
                trip_id: 1,
                sync: k as i64,
                time: t,
                speed: mps_to_mph(20.0 + (0.05 * t).sin()),
                yaw_rate: 2.0 * (0.1 * t).sin(),
                acc_lat: Some(0.01),
                acc_lon: Some(0.005 * (0.05 * t).cos()),
                speed_gps: None,
                heading: None,
                brake: None,
                signal: None,
            }
        })
        .collect()
}

/// One target ahead of a straight-driving ego, per channel.
fn make_returns(n: usize, channels: u32) -> Vec<RadarReturn> {
    let p = CoordinateProjector::default();
    (0..channels)
        .flat_map(|ch| {
            let p = p.clone();
            (0..n).map(move |k| {
                let t = k as f64 * DT;
                let ego = EgoState {
                    x: 20.0 * t,
                    v: 20.0,
                    ..Default::default()
                };
                let target = (30.0 + 10.0 * ch as f64 + 22.0 * t, 1.5, 22.0, 0.0);
                p.synthesize_return(&ego, t, target, SensorDirection::Forward, ch)
            })
        })
        .collect()
}

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("ego");
    let estimator = EgoStateEstimator::new(Default::default());
    for n in [1_000, 10_000] {
        let samples = make_ego(n);
        group.bench_function(format!("{n}_samples"), |b| {
            b.iter(|| black_box(estimator.estimate(&samples, RunDirection::Forward)))
        });
    }
    group.finish();

    let mut group = c.benchmark_group("trip");
    let processor = TripProcessor::new(ReconstructionConfig::default()).expect("default config is valid");
    for channels in [4, 16] {
        let trip = TripInput {
            trip_id: TripId(1),
            ego_length: None,
            ego: make_ego(2_000),
            forward: make_returns(2_000, channels),
            rearward: Vec::new(),
            event: None,
        };
        group.bench_function(format!("{channels}_tracks"), |b| {
            b.iter(|| {
                let mut alloc = TargetIdAllocator::new(1);
                black_box(processor.process_trip(&trip, &mut alloc))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_filters);
criterion_main!(benches);
