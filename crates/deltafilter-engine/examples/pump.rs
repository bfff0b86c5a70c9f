use std::io;

use deltafilter_core::{FilterConfig, Reading};
use deltafilter_engine::DeltaEngine;
use serde::Serialize;
use time::macros::datetime;
use time::Duration;

#[derive(Serialize)]
struct DecisionRecord<'a> {
    reading: &'a Reading,
    forwarded: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = FilterConfig::new("10", "1", "per minute");
    let engine = DeltaEngine::from_config(&config);
    let start = datetime!(2026-10-19 10:00:00 UTC);

    let readings: Vec<Reading> = [(0, 100.0), (10, 105.0), (20, 112.0), (30, 113.0), (85, 113.0)]
        .into_iter()
        .map(|(secs, temp)| {
            Reading::new("pump1", start + Duration::seconds(secs)).with_datapoint("temp", temp)
        })
        .collect();

    // one reading per batch so every decision can be reported
    for reading in &readings {
        let forwarded = !engine.process(vec![reading.clone()]).is_empty();
        serde_json::to_writer(io::stdout(), &DecisionRecord { reading, forwarded })?;
        println!();
    }

    serde_json::to_writer_pretty(io::stdout(), &engine.snapshot())?;
    println!();

    Ok(())
}
