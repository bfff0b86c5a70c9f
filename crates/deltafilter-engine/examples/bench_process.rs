use deltafilter_core::Reading;
use deltafilter_engine::{DeltaEngine, DeltaPolicy};
use std::time::Instant;
use time::macros::datetime;
use time::Duration;

const ASSETS: usize = 1000;
const BATCH: usize = 100;

fn main() {
    let start_ts = datetime!(2026-10-19 10:00:00 UTC);
    let engine = DeltaEngine::new(DeltaPolicy::new(5.0, Duration::seconds(60)));

    let make_batch = |round: i64| -> Vec<Reading> {
        (0..BATCH)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let temp = 20.0 + (round % 7) as f64;
                Reading::new(format!("asset_{}", i % ASSETS), start_ts + Duration::seconds(round))
                    .with_datapoint("temp", temp)
                    .with_datapoint("state", "running")
            })
            .collect()
    };

    // Warmup
    for round in 0..10 {
        engine.process(make_batch(round));
    }

    let iterations = 10_000;
    let batches: Vec<Vec<Reading>> = (0..iterations).map(|r| make_batch(r + 10)).collect();
    let start = Instant::now();
    let mut forwarded = 0;
    for batch in batches {
        forwarded += engine.process(batch).len();
    }
    let duration = start.elapsed();

    println!(
        "Processed {} batches of {} readings in {:?} ({} forwarded)",
        iterations, BATCH, duration, forwarded
    );
    println!(
        "Average per batch: {:?}",
        duration / u32::try_from(iterations).unwrap()
    );

    // Measure filling the state table with new assets
    let engine = DeltaEngine::default();
    let start = Instant::now();
    for i in 0..ASSETS * 10 {
        let reading = Reading::new(format!("fresh_{i}"), start_ts).with_datapoint("temp", 1.0);
        engine.process(vec![reading]);
    }
    let duration = start.elapsed();
    println!(
        "Inserting {} new assets took: {:?} ({} tracked)",
        ASSETS * 10,
        duration,
        engine.asset_count()
    );
}
