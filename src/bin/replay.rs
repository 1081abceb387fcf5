//! Tag Replay - run recorded sensor reports through the tracker offline
//!
//! Reads a JSONL file with one sensor report per line, processes each in
//! order, and writes every emitted presence event to stdout as JSONL.
//! Maintenance runs on the recorded clock (each report's `sent_on`), so a
//! capture replays the same exit departures it would have produced live.
//!
//! Usage:
//!   tag-replay --input capture.jsonl
//!   tag-replay --input capture.jsonl --config config/dev.toml --finalize

use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tag_tracker::domain::types::SensorReport;
use tag_tracker::infra::{Config, Metrics};
use tag_tracker::services::{MemorySink, Tracker, TrackerInput};

/// Tag Replay - offline tracker runs over captured sensor reports
#[derive(Parser, Debug)]
#[command(name = "tag-replay", version, about, long_about = None)]
struct Args {
    /// JSONL file of sensor reports
    #[arg(short, long)]
    input: String,

    /// Path to TOML configuration file (thresholds, sensors, mobility profiles)
    #[arg(short, long)]
    config: Option<String>,

    /// After the last report, advance the clock past the exit threshold
    /// so tags still exiting are finalized
    #[arg(long)]
    finalize: bool,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries events
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.validate()?;
    let exit_threshold_ms = config.aggregate_departed_threshold_ms();

    let sink = Arc::new(MemorySink::new());
    let tracker = Tracker::new(config, Arc::new(Metrics::new()), sink.clone());

    let file = File::open(&args.input).with_context(|| format!("Failed to open {}", args.input))?;
    let mut out = BufWriter::new(std::io::stdout().lock());
    let mut clock = 0u64;
    let mut reports = 0usize;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let report: SensorReport = match serde_json::from_str(&line) {
            Ok(report) => report,
            Err(e) => {
                warn!(line = %(line_no + 1), error = %e, "report_parse_failed");
                continue;
            }
        };

        let report_clock = report
            .data
            .iter()
            .map(|r| r.last_read_on)
            .max()
            .unwrap_or(report.sent_on)
            .max(report.sent_on);
        clock = clock.max(report_clock);

        tracker.process_input(TrackerInput::Report(report));
        tracker.aggregate_departed(clock);
        reports += 1;
        sink.drain_locations();

        for event in sink.drain_events() {
            serde_json::to_writer(&mut out, &event)?;
            out.write_all(b"\n")?;
        }
    }

    if args.finalize {
        tracker.aggregate_departed(clock.saturating_add(exit_threshold_ms).saturating_add(1));
        for event in sink.drain_events() {
            serde_json::to_writer(&mut out, &event)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;

    info!(reports = %reports, tags = %tracker.tag_count(), "replay_complete");
    Ok(())
}
