use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

const DEFAULT_POLL_MS: u64 = 250;

/// Command-line arguments for the anteprima binary.
#[derive(Debug, Parser)]
#[command(name = "anteprima", version, about = "Adaptive incremental markdown preview")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ANTEPRIMA_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    pub fn overrides(&self) -> &PreviewOverrides {
        match &self.command {
            Command::Render(args) => &args.overrides,
            Command::Watch(args) => &args.overrides,
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a markdown file once.
    Render(RenderArgs),
    /// Re-render a markdown file whenever it changes.
    Watch(WatchArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: PreviewOverrides,

    /// Markdown file to render.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Write HTML here instead of stdout.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub overrides: PreviewOverrides,

    /// Markdown file to watch.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// File that receives every applied render.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// How often the input file is checked for changes.
    #[arg(long = "poll-ms", value_name = "MILLIS", default_value_t = DEFAULT_POLL_MS)]
    pub poll_ms: u64,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PreviewOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the number of rendered blocks kept in memory.
    #[arg(long = "cache-max-blocks", value_name = "COUNT")]
    pub cache_max_blocks: Option<usize>,

    /// Override the shortest debounce interval.
    #[arg(long = "min-delay-ms", value_name = "MILLIS")]
    pub min_delay_ms: Option<u64>,

    /// Override the longest debounce interval.
    #[arg(long = "max-delay-ms", value_name = "MILLIS")]
    pub max_delay_ms: Option<u64>,

    /// Override the size at which documents render incrementally.
    #[arg(long = "large-doc-threshold-chars", value_name = "CHARS")]
    pub large_doc_threshold_chars: Option<usize>,

    /// Override how many blocks around the cursor are pre-rendered.
    #[arg(long = "predictive-window-blocks", value_name = "COUNT")]
    pub predictive_window_blocks: Option<usize>,
}
