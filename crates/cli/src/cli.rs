use clap::{Parser, ValueEnum};

/// Replay a renderer signal trace through the scheduler.
///
/// Reads JSON lines of timestamped input, frame, lifecycle and task events,
/// feeds them to a scheduler running on a simulated clock, and reports the
/// use cases it went through.
#[derive(Parser, Debug)]
#[command(name = "cadence-replay", version, about)]
pub struct CliArgs {
    /// Trace file in JSON lines, or `-` for stdin
    #[arg(long)]
    pub trace: String,

    /// Scheduler config file (TOML); defaults plus env overrides if unset
    #[arg(long, env = "CADENCE_CONFIG")]
    pub config: Option<String>,

    /// Output format for transitions and the final report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Run throttleable queues on virtual time
    #[arg(long)]
    pub virtual_time: bool,

    /// Keep simulating this long after the last event so expirations land
    #[arg(long, default_value_t = 2000)]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
