mod cli;
mod replay;
mod report;
mod trace;

use std::fs::File;
use std::io::{self, BufReader};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cadence_core::config::load_dotenv;
use cadence_core::SchedulerConfig;

use crate::cli::{CliArgs, OutputFormat};
use crate::replay::{Replayer, Transition};
use crate::report::{transition_line, RunSummary};
use crate::trace::parse_trace;

fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = CliArgs::parse();

    let config = match args.config.as_deref() {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("failed to load scheduler config from {path}"))?,
        None => SchedulerConfig::from_env().context("invalid scheduler config in environment")?,
    };
    config.log_summary();

    let records = if args.trace == "-" {
        parse_trace(io::stdin().lock()).context("failed to parse trace from stdin")?
    } else {
        let file = File::open(&args.trace).with_context(|| format!("failed to open trace {}", args.trace))?;
        parse_trace(BufReader::new(file)).with_context(|| format!("failed to parse trace {}", args.trace))?
    };
    info!(events = records.len(), trace = %args.trace, "replaying trace");

    let format = args.format;
    let mut print_transition = |t: &Transition| match format {
        OutputFormat::Text => println!("{}", transition_line(t)),
        // One object per line so transitions can be streamed.
        OutputFormat::Json => match serde_json::to_string(t) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode transition"),
        },
    };

    let mut replayer = Replayer::new(config, args.virtual_time);
    for record in &records {
        replayer.apply(record, &mut print_transition);
    }
    let report = replayer.finish(Duration::from_millis(args.settle_ms), &mut print_transition);

    let summary = RunSummary::new(args.trace.clone(), report);
    match format {
        OutputFormat::Text => print!("{}", summary.to_text()),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary).context("failed to encode report")?)
        }
    }

    info!(
        transitions = summary.report.transitions.len(),
        final_use_case = %summary.report.final_use_case,
        "replay complete"
    );
    Ok(())
}
