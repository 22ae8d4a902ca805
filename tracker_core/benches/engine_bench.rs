use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tracker_core::{EngineConfig, Frame, Point, TrackingEngine};

fn make_frame(n: usize, index: u64, jitter: f64) -> Frame {
    let detections = (0..n)
        .map(|i| {
            let cols = 40;
            Point::new(
                (i % cols) as f64 * 15.0 + 10.0 + jitter,
                (i / cols) as f64 * 15.0 + 10.0,
            )
        })
        .collect();
    let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(index as i64 * 33);
    Frame::new(index, ts, detections)
}

fn zoned_engine() -> TrackingEngine {
    let engine = TrackingEngine::with_empty_registry(EngineConfig::default());
    for z in 0..8u32 {
        let x = z as f64 * 75.0;
        engine
            .zones()
            .upsert(
                z,
                vec![
                    Point::new(x, 0.0),
                    Point::new(x + 70.0, 0.0),
                    Point::new(x + 70.0, 480.0),
                    Point::new(x, 480.0),
                ],
                Utc::now(),
            )
            .expect("bench zone is valid");
    }
    engine
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    for n in [10, 50, 200, 800] {
        group.bench_function(format!("{n}_people"), |b| {
            b.iter(|| {
                let mut engine = zoned_engine();
                // Warm up with one frame to create tracks
                engine.process_frame(&make_frame(n, 0, 0.0));
                // Measure a full cycle with established tracks
                black_box(engine.process_frame(&make_frame(n, 1, 3.0)));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
