//! Logging setup for mathpool.
//!
//! # Environment Variables
//!
//! - `MATHPOOL_LOG` - Log filter (overrides RUST_LOG)
//! - `MATHPOOL_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `MATHPOOL_LOG_FORMAT` - Output format: pretty, compact, json
//! - `MATHPOOL_LOG_FILE` - Path to log file (in addition to stderr)
//! - `MATHPOOL_LOG_ROTATION` - File rotation: hourly, daily, never
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! Renderer protocol lines are logged at `trace` under `mathpool::pool`, so
//! `MATHPOOL_LOG=mathpool::pool=trace` shows every line sent and read.
//!
//! # Example
//!
//! ```no_run
//! use mathpool::logging::{LogConfig, init};
//!
//! init(LogConfig::default().with_env_overrides());
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{Level, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, MakeWriter, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// Single line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{s}'. Valid options: pretty, compact, json"
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Rotation for the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "never" => Ok(Self::Never),
            _ => Err(format!(
                "Unknown log rotation: '{s}'. Valid options: hourly, daily, never"
            )),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration, built up and passed to [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level when no filter is set (default: WARN).
    pub level: Level,
    pub format: LogFormat,
    /// Also log to this file.
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Log span close events with timing.
    pub span_events: bool,
    /// Filter directive; overrides `level`.
    pub filter: Option<String>,
    pub show_target: bool,
    /// Thread names identify renderer reader threads.
    pub show_thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Pretty,
            file_path: None,
            rotation: LogRotation::Daily,
            span_events: false,
            filter: None,
            show_target: true,
            show_thread_names: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_thread_names(mut self, enabled: bool) -> Self {
        self.show_thread_names = enabled;
        self
    }

    /// Apply `MATHPOOL_LOG*` environment overrides.
    ///
    /// A filter already set (from `-v`/`-q`) wins over the environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if self.filter.is_none() {
            self.filter = var("MATHPOOL_LOG").or_else(|| var("RUST_LOG"));
        }

        if self.filter.is_none()
            && let Some(level) = var("MATHPOOL_LOG_LEVEL").as_deref().and_then(parse_level)
        {
            self.level = level;
        }

        if let Some(format) = var("MATHPOOL_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            self.format = format;
        }

        if let Some(path) = var("MATHPOOL_LOG_FILE") {
            self.file_path = Some(PathBuf::from(path));
        }

        if let Some(rotation) = var("MATHPOOL_LOG_ROTATION").and_then(|r| r.parse().ok()) {
            self.rotation = rotation;
        }

        self
    }

    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string().to_lowercase());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{filter}', using default");
                fallback()
            }),
            None => fallback(),
        }
    }

    /// One fmt layer in the configured format.
    fn fmt_layer<S, W>(&self, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + 'static,
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let span_events = if self.span_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_span_events(span_events)
            .with_target(self.show_target)
            .with_thread_names(self.show_thread_names);

        match self.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Pretty => layer.boxed(),
        }
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Install the global subscriber: stderr, plus the log file when configured.
///
/// Call after [`disable_colors`](crate::theme::disable_colors) so stderr
/// output follows it. Later calls are ignored.
pub fn init(config: LogConfig) {
    let filter = config.build_filter();
    let mut layers = vec![config.fmt_layer(std::io::stderr, crate::theme::colors_enabled())];
    if let Some(path) = config.file_path.as_deref() {
        let (dir, file_name) = split_log_path(path);
        let appender = RollingFileAppender::new(config.rotation.into(), dir, file_name);
        layers.push(config.fmt_layer(appender, false));
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init();
}

fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("mathpool.log");
    (dir, file_name)
}
