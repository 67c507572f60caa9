//! Command-line interface definitions using clap.

use crate::equation::{DEFAULT_FONT, InputFormat, KNOWN_FONTS};
use crate::output::OutputFormat;
use crate::pool::{PoolConfig, RendererConfig, default_max_instances};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Convert TeX and MathML to SVG through a pool of renderer processes.
#[derive(Parser, Debug)]
#[command(name = "mathpool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub renderer: RendererArgs,

    #[command(flatten)]
    pub pool: PoolArgs,

    /// Enable verbose output (-v info, -vv debug, -vvv protocol trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert one equation and print the SVG.
    Convert(ConvertArgs),

    /// Convert a file of JSON-lines equations concurrently and report.
    Batch(BatchArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// How renderer processes are launched.
#[derive(Args, Debug, Clone)]
pub struct RendererArgs {
    /// Program the renderer runs under; empty to execute it directly.
    #[arg(long, env = "MATHPOOL_LAUNCHER", default_value = "node")]
    pub launcher: String,

    /// Renderer script or executable.
    #[arg(long, env = "MATHPOOL_RENDERER", default_value = "mathjax/main.js")]
    pub renderer: PathBuf,

    /// Directory handed to the renderer for its resources.
    #[arg(long, env = "MATHPOOL_RENDERER_DIR", default_value = "mathjax")]
    pub renderer_dir: PathBuf,
}

impl RendererArgs {
    pub fn to_config(&self) -> RendererConfig {
        RendererConfig {
            launcher: Some(self.launcher.clone()).filter(|l| !l.is_empty()),
            executable: self.renderer.clone(),
            renderer_dir: self.renderer_dir.clone(),
        }
    }
}

/// Pool tuning.
#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    /// Maximum concurrent renderer processes.
    #[arg(long, env = "MATHPOOL_MAX_INSTANCES", default_value_t = default_max_instances())]
    pub max_instances: usize,

    /// Number of results kept in the cache.
    #[arg(long, env = "MATHPOOL_CACHE_CAPACITY", default_value_t = 100)]
    pub cache_capacity: usize,

    /// Per-line response timeout in milliseconds.
    #[arg(long, env = "MATHPOOL_TIMEOUT_MS", default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Minimum milliseconds between process spawns.
    #[arg(long, env = "MATHPOOL_CREATION_INTERVAL_MS", default_value_t = 200)]
    pub creation_interval_ms: u64,

    /// Milliseconds to wait for a busy instance of the same font.
    #[arg(long, env = "MATHPOOL_SAME_FONT_GRACE_MS", default_value_t = 500)]
    pub same_font_grace_ms: u64,

    /// Seconds between spare-instance sweeps (0 disables).
    #[arg(long, env = "MATHPOOL_REAPER_PERIOD_SECS", default_value_t = 60)]
    pub reaper_period_secs: u64,

    /// Seconds of history used to judge how many instances are needed.
    #[arg(long, env = "MATHPOOL_IDLE_WINDOW_SECS", default_value_t = 120)]
    pub idle_window_secs: u64,
}

impl PoolArgs {
    pub fn to_config(&self) -> PoolConfig {
        PoolConfig {
            max_instances: self.max_instances,
            cache_capacity: self.cache_capacity,
            processing_timeout: Duration::from_millis(self.timeout_ms),
            creation_interval: Duration::from_millis(self.creation_interval_ms),
            same_font_grace: Duration::from_millis(self.same_font_grace_ms),
            reaper_period: Some(Duration::from_secs(self.reaper_period_secs))
                .filter(|p| !p.is_zero()),
            idle_window: Duration::from_secs(self.idle_window_secs),
            ..PoolConfig::default()
        }
    }
}

/// Input format argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Display-mode TeX.
    #[default]
    Tex,
    /// Inline TeX.
    InlineTex,
    /// MathML (a TeX annotation is used when present).
    Mathml,
}

impl From<FormatArg> for InputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Tex => InputFormat::TexDisplay,
            FormatArg::InlineTex => InputFormat::TexInline,
            FormatArg::Mathml => InputFormat::Mathml,
        }
    }
}

/// Arguments for the convert command.
#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Equation source; read from stdin when omitted or `-`.
    pub content: Option<String>,

    /// Input format.
    #[arg(short, long, value_enum, default_value_t = FormatArg::Tex)]
    pub format: FormatArg,

    /// Renderer font.
    #[arg(long, default_value = DEFAULT_FONT, value_parser = parse_font)]
    pub font: String,

    /// Print the MathML instead of the SVG.
    #[arg(long)]
    pub mathml: bool,
}

/// Arguments for the batch command.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// JSON-lines file of equations, or `-` for stdin.
    pub input: PathBuf,

    /// Number of concurrent callers.
    #[arg(short = 'j', long, default_value_t = 4)]
    pub threads: usize,

    /// Output format.
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormatArg::Table)]
    pub output: OutputFormatArg,

    /// Use ASCII table borders instead of Unicode.
    #[arg(long)]
    pub ascii: bool,
}

/// Output format argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormatArg {
    /// Colored table output.
    #[default]
    Table,
    /// JSON output.
    Json,
    /// Plain text output (no colors).
    Plain,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Plain => OutputFormat::Plain,
        }
    }
}

/// Arguments for shell completions.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate and print completions to stdout.
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "mathpool",
            &mut std::io::stdout(),
        );
    }
}

/// Accept only fonts the renderer ships with.
pub fn parse_font(s: &str) -> Result<String, String> {
    if KNOWN_FONTS.contains(&s) {
        Ok(s.to_string())
    } else {
        Err(format!(
            "unknown font '{s}' (known: {})",
            KNOWN_FONTS.join(", ")
        ))
    }
}

/// Verbosity level for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// -q: errors only.
    Quiet,
    /// Default: warnings and errors.
    Normal,
    /// -v: pool lifecycle.
    Info,
    /// -vv: instance spawns and closes.
    Debug,
    /// -vvv: every protocol line.
    Trace,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            return Verbosity::Quiet;
        }
        match self.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Info,
            2 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }

    /// Log filter implied by `-v`/`-q`, if any.
    pub fn log_filter(&self) -> Option<&'static str> {
        match self.verbosity() {
            Verbosity::Quiet => Some("error"),
            Verbosity::Normal => None,
            Verbosity::Info => Some("mathpool=info"),
            Verbosity::Debug => Some("mathpool=debug"),
            Verbosity::Trace => Some("mathpool=trace"),
        }
    }
}
