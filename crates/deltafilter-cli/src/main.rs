//! CLI for deltafilter.
//!
//! Replays JSON-lines reading streams through the delta engine and writes the
//! forwarded readings to stdout. A line of the form `{"reconfigure": {..}}`
//! reconfigures the live filter between readings.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use deltafilter_core::{Filter, FilterConfig, Reading};
use deltafilter_engine::{DeltaEngine, DeltaPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter a stream of readings (JSON lines)
    Run {
        /// Input file; reads stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,

        /// Number of readings handed to the engine at once (default: 100)
        #[arg(long, default_value = "100")]
        batch_size: usize,

        /// Accumulate per-asset forward/drop counters in this file
        #[arg(long)]
        stats_file: Option<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the policy a configuration translates to
    Policy {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Filter configuration file (JSON with tolerance, minRate, rateUnit)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tolerance in percent; overrides the config file
    #[arg(long)]
    tolerance: Option<String>,

    /// Minimum number of readings per rate unit; overrides the config file
    #[arg(long)]
    min_rate: Option<String>,

    /// "per second", "per minute", "per hour" or "per day"; overrides the config file
    #[arg(long)]
    rate_unit: Option<String>,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<FilterConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                deltafilter_engine::parse_config(&text)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => FilterConfig::default(),
        };
        if let Some(tolerance) = &self.tolerance {
            config.tolerance.clone_from(tolerance);
        }
        if let Some(min_rate) = &self.min_rate {
            config.min_rate.clone_from(min_rate);
        }
        if let Some(rate_unit) = &self.rate_unit {
            config.rate_unit.clone_from(rate_unit);
        }
        Ok(config)
    }
}

#[derive(Debug)]
enum InputRecord {
    Reading(Reading),
    Reconfigure(FilterConfig),
}

fn parse_line(line: &str) -> serde_json::Result<InputRecord> {
    let mut value: Value = serde_json::from_str(line)?;
    match value.get_mut("reconfigure").map(Value::take) {
        Some(config) => Ok(InputRecord::Reconfigure(serde_json::from_value(config)?)),
        None => Ok(InputRecord::Reading(serde_json::from_value(value)?)),
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
struct AssetCounters {
    received: u64,
    forwarded: u64,
}

impl AssetCounters {
    fn dropped(&self) -> u64 {
        self.received.saturating_sub(self.forwarded)
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct FilterStats {
    by_asset: BTreeMap<String, AssetCounters>,
    #[serde(with = "time::serde::iso8601")]
    last_updated: OffsetDateTime,
}

impl Default for FilterStats {
    fn default() -> Self {
        Self {
            by_asset: BTreeMap::new(),
            last_updated: OffsetDateTime::now_utc(),
        }
    }
}

impl FilterStats {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path)?;
        let stats = serde_json::from_reader(file)?;
        Ok(stats)
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    fn record_received(&mut self, asset: &str) {
        self.by_asset.entry(asset.to_owned()).or_default().received += 1;
    }

    fn record_forwarded(&mut self, asset: &str) {
        self.by_asset.entry(asset.to_owned()).or_default().forwarded += 1;
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RunSummary {
    received: usize,
    forwarded: usize,
    reconfigurations: usize,
}

impl RunSummary {
    fn dropped(&self) -> usize {
        self.received.saturating_sub(self.forwarded)
    }
}

/// Hands the pending batch to the filter and writes out what it forwards.
fn flush<W: Write>(
    filter: &dyn Filter,
    batch: &mut Vec<Reading>,
    out: &mut W,
    summary: &mut RunSummary,
    stats: &mut FilterStats,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let readings = std::mem::take(batch);
    summary.received += readings.len();
    for reading in &readings {
        stats.record_received(reading.asset());
    }

    let forwarded = filter.ingest(readings);
    summary.forwarded += forwarded.len();
    for reading in &forwarded {
        stats.record_forwarded(reading.asset());
        serde_json::to_writer(&mut *out, reading)?;
        writeln!(out)?;
    }
    Ok(())
}

fn run_stream<R: BufRead, W: Write>(
    filter: &dyn Filter,
    reader: R,
    out: &mut W,
    batch_size: usize,
    stats: &mut FilterStats,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    let mut batch = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("Failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line).with_context(|| format!("Malformed record on line {line_no}"))? {
            InputRecord::Reading(reading) => {
                batch.push(reading);
                if batch.len() >= batch_size {
                    flush(filter, &mut batch, out, &mut summary, stats)?;
                }
            }
            InputRecord::Reconfigure(config) => {
                // readings before the control record are judged by the old policy
                flush(filter, &mut batch, out, &mut summary, stats)?;
                filter.reconfigure(&config);
                summary.reconfigurations += 1;
                tracing::info!(
                    line = line_no,
                    tolerance = %config.tolerance,
                    min_rate = %config.min_rate,
                    rate_unit = %config.rate_unit,
                    "filter reconfigured"
                );
            }
        }
    }
    flush(filter, &mut batch, out, &mut summary, stats)?;
    out.flush()?;

    stats.last_updated = OffsetDateTime::now_utc();
    Ok(summary)
}

#[derive(Serialize, Debug)]
struct PolicyReport {
    tolerance: f64,
    min_interval_us: i64,
    rate_constrained: bool,
}

impl From<DeltaPolicy> for PolicyReport {
    fn from(policy: DeltaPolicy) -> Self {
        Self {
            tolerance: policy.tolerance,
            min_interval_us: policy.min_interval_micros(),
            rate_constrained: policy.has_rate_constraint(),
        }
    }
}

fn run(
    input: Option<&Path>,
    batch_size: usize,
    stats_file: Option<&Path>,
    config: &FilterConfig,
) -> Result<()> {
    if batch_size == 0 {
        anyhow::bail!("--batch-size must be at least 1");
    }

    let engine = DeltaEngine::from_config(config);
    tracing::debug!(snapshot = %engine.snapshot(), "engine ready");

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(File::open(path).with_context(|| {
            format!("Failed to open input file {}", path.display())
        })?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut stats = match stats_file {
        Some(path) => FilterStats::load(path).unwrap_or_else(|e| {
            tracing::warn!(
                "failed to read stats from {}; starting fresh: {e}",
                path.display()
            );
            FilterStats::default()
        }),
        None => FilterStats::default(),
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let summary = run_stream(&engine, reader, &mut out, batch_size, &mut stats)?;

    if let Some(path) = stats_file {
        stats.save(path).context("Failed to save stats")?;
    }

    eprintln!(
        "Received {} readings, forwarded {}, dropped {} ({} assets, {} reconfigurations).",
        summary.received,
        summary.forwarded,
        summary.dropped(),
        engine.asset_count(),
        summary.reconfigurations
    );
    for (asset, counters) in &stats.by_asset {
        tracing::debug!(
            asset = asset.as_str(),
            received = counters.received,
            forwarded = counters.forwarded,
            dropped = counters.dropped(),
            "asset totals"
        );
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            batch_size,
            stats_file,
            config,
        } => {
            let config = config.resolve()?;
            run(input.as_deref(), batch_size, stats_file.as_deref(), &config)?;
        }
        Commands::Policy { config } => {
            let config = config.resolve()?;
            let report = PolicyReport::from(DeltaPolicy::from_config(&config));
            serde_json::to_writer_pretty(io::stdout(), &report)?;
            println!();
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PUMP: &str = concat!(
        r#"{"asset_code":"pump1","user_ts":"2026-10-19T10:00:00Z","readings":{"temp":100.0}}"#,
        "\n",
        r#"{"asset_code":"pump1","user_ts":"2026-10-19T10:00:01Z","readings":{"temp":105.0}}"#,
        "\n\n",
        r#"{"asset_code":"pump1","user_ts":"2026-10-19T10:00:02Z","readings":{"temp":112.0}}"#,
        "\n",
    );

    fn replay(
        input: &str,
        config: &FilterConfig,
        batch_size: usize,
    ) -> (RunSummary, Vec<Reading>, FilterStats) {
        let engine = DeltaEngine::from_config(config);
        let mut out = Vec::new();
        let mut stats = FilterStats::default();
        let summary =
            run_stream(&engine, input.as_bytes(), &mut out, batch_size, &mut stats).unwrap();
        let forwarded = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| Reading::from_json(l).unwrap())
            .collect();
        (summary, forwarded, stats)
    }

    #[test]
    fn test_run_stream_pump_example() {
        for batch_size in [1, 2, 100] {
            let (summary, forwarded, stats) =
                replay(PUMP, &FilterConfig::new("10", "0", "per second"), batch_size);
            assert_eq!(
                summary,
                RunSummary {
                    received: 3,
                    forwarded: 2,
                    reconfigurations: 0
                }
            );
            assert_eq!(forwarded.len(), 2);
            assert_eq!(forwarded[1].user_ts().second(), 2);
            assert_eq!(
                stats.by_asset["pump1"],
                AssetCounters {
                    received: 3,
                    forwarded: 2
                }
            );
            assert_eq!(stats.by_asset["pump1"].dropped(), 1);
        }
    }

    #[test]
    fn test_run_stream_applies_control_records() {
        let input = r#"{"asset_code":"a","user_ts":"2026-10-19T10:00:00Z","readings":{"temp":100.0}}
{"asset_code":"a","user_ts":"2026-10-19T10:00:01Z","readings":{"temp":105.0}}
{"reconfigure":{"tolerance":"1","minRate":0,"rateUnit":"per second"}}
{"asset_code":"a","user_ts":"2026-10-19T10:00:02Z","readings":{"temp":105.0}}
"#;
        let config = FilterConfig::new("10", "0", "per second");
        let (summary, forwarded, _) = replay(input, &config, 100);
        assert_eq!(summary.reconfigurations, 1);
        assert_eq!(summary.dropped(), 1);
        // 105.0 was dropped under 10% but is news under 1%
        assert_eq!(forwarded.len(), 2);
    }

    #[test]
    fn test_run_stream_reports_malformed_line() {
        let input = concat!(
            r#"{"asset_code":"a","user_ts":"2026-10-19T10:00:00Z","readings":{}}"#,
            "\nnot json\n",
        );
        let engine = DeltaEngine::default();
        let err = run_stream(
            &engine,
            input.as_bytes(),
            &mut Vec::new(),
            10,
            &mut FilterStats::default(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("line 2"), "{err:#}");
    }

    #[test]
    fn test_parse_line_distinguishes_records() {
        assert!(matches!(
            parse_line(r#"{"reconfigure":{"tolerance":5}}"#).unwrap(),
            InputRecord::Reconfigure(c) if c.tolerance == "5"
        ));
        let reading = r#"{"asset_code":"a","user_ts":"2026-10-19T10:00:00Z","readings":{}}"#;
        assert!(matches!(
            parse_line(reading).unwrap(),
            InputRecord::Reading(r) if r.asset() == "a"
        ));
        assert!(parse_line(r#"{"asset_code":"a"}"#).is_err());
    }

    #[test]
    fn test_config_args_override_file() {
        let dir =
            std::env::temp_dir().join(format!("deltafilter_test_config_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("filter.json");
        fs::write(&path, r#"{"tolerance": 5, "minRate": 2, "rateUnit": "per hour"}"#).unwrap();

        let args = ConfigArgs {
            config: Some(path),
            min_rate: Some("4".into()),
            ..ConfigArgs::default()
        };
        let config = args.resolve().unwrap();
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(config, FilterConfig::new("5", "4", "per hour"));
    }

    #[test]
    fn test_stats_roundtrip_through_file() {
        let dir =
            std::env::temp_dir().join(format!("deltafilter_test_stats_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("stats.json");

        let mut stats = FilterStats::load(&path).unwrap();
        assert!(stats.by_asset.is_empty());
        stats.record_received("a");
        stats.record_received("a");
        stats.record_forwarded("a");
        stats.save(&path).unwrap();

        let loaded = FilterStats::load(&path).unwrap();
        let _ = fs::remove_dir_all(&dir);
        assert_eq!(loaded.by_asset["a"].dropped(), 1);
    }

    #[test]
    fn test_dropped_saturates_on_inconsistent_counters() {
        let counters = AssetCounters {
            received: 2,
            forwarded: 5,
        };
        assert_eq!(counters.dropped(), 0);

        let summary = RunSummary {
            received: 1,
            forwarded: 3,
            reconfigurations: 0,
        };
        assert_eq!(summary.dropped(), 0);
    }

    #[test]
    fn test_run_stream_accepts_huge_batch_size() {
        let (summary, forwarded, _) = replay(PUMP, &FilterConfig::default(), usize::MAX);
        assert_eq!(summary.received, 3);
        assert_eq!(forwarded.len(), summary.forwarded);
    }

    #[test]
    fn test_policy_report() {
        let report = PolicyReport::from(DeltaPolicy::from_config(&FilterConfig::new(
            "10",
            "120",
            "per minute",
        )));
        assert!(!report.rate_constrained);
        assert_eq!(report.min_interval_us, 0);
    }
}
