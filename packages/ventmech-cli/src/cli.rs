use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ventmech",
    version,
    about = "Ventilator waveform mechanics and asynchrony analysis",
    long_about = "Estimate per-breath respiratory mechanics from ventilator recordings\n\
                  (<prefix>_<patient>_<date>_<HH-MM-SS>.txt) and summarize them per hour and day.\n\
                  Breath classification and asynchrony magnitude need model commands:\n\
                  set $VENTMECH_CLASSIFIER_CMD / $VENTMECH_RECONSTRUCTOR_CMD or pass them as flags."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Analyze one recording
    Analyze(AnalyzeArgs),
    /// Analyze many recordings and build daily summaries
    Batch(BatchArgs),
    /// Parse a recording and report what would be analyzed
    Validate(ValidateArgs),
    /// Show version, platform and model configuration
    Info(InfoArgs),
}

/// Options shared by every command that runs the full pipeline
#[derive(Args, Clone, Default)]
pub struct PipelineArgs {
    /// Shell command serving the breath classifier
    #[arg(long, env = "VENTMECH_CLASSIFIER_CMD")]
    pub classifier_cmd: Option<String>,

    /// Shell command serving the pressure reconstruction model
    #[arg(long, env = "VENTMECH_RECONSTRUCTOR_CMD")]
    pub reconstructor_cmd: Option<String>,

    /// Analysis configuration (JSON)
    #[arg(long)]
    pub config: Option<String>,

    /// Directory of the JSON result store
    #[arg(long)]
    pub store: Option<String>,

    /// Return stored analyses instead of recomputing them
    #[arg(long, default_value_t = false, requires = "store")]
    pub reuse_stored: bool,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Recording file path
    #[arg(long)]
    pub file: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Include the flattened pressure/flow trace in the output
    #[arg(long, default_value_t = false)]
    pub include_trace: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern selecting recordings (e.g. "data/*.txt")
    #[arg(long)]
    pub glob: Option<String>,

    /// Explicit list of recordings
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    /// Directory searched recursively for .txt recordings
    #[arg(long)]
    pub dir: Option<String>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Worker threads (default: one per core)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Write one JSON file per recording and per day into this directory
    #[arg(long)]
    pub output_dir: Option<String>,

    /// List the resolved files and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Include the flattened pressure/flow traces in the output
    #[arg(long, default_value_t = false)]
    pub include_trace: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Recording file path
    #[arg(long)]
    pub file: String,

    /// Analysis configuration (JSON)
    #[arg(long)]
    pub config: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Shell command serving the breath classifier
    #[arg(long, env = "VENTMECH_CLASSIFIER_CMD")]
    pub classifier_cmd: Option<String>,

    /// Shell command serving the pressure reconstruction model
    #[arg(long, env = "VENTMECH_RECONSTRUCTOR_CMD")]
    pub reconstructor_cmd: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
