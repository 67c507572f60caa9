//! Output formatting for batch reports and pool status.

pub mod json;
pub mod plain;
pub mod table;

use crate::equation::{Equation, InputFormat};
use crate::error::PoolError;
use crate::telemetry::PoolStatus;
use serde::Serialize;
use std::time::Duration;

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Colored table output (default).
    #[default]
    Table,
    /// JSON output.
    Json,
    /// Plain text output (no colors).
    Plain,
}

/// Table display options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
    /// Use ASCII borders instead of Unicode.
    pub ascii: bool,
}

/// What happened to one equation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Converted { svg_bytes: usize },
    /// The renderer reported an error.
    Rejected { message: String },
    /// The renderer process failed.
    Failed { message: String },
}

impl Outcome {
    pub fn from_error(err: &PoolError) -> Self {
        match err {
            PoolError::Conversion(message) => Self::Rejected {
                message: message.clone(),
            },
            other => Self::Failed {
                message: other.to_string(),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Converted { .. } => "converted",
            Self::Rejected { .. } => "rejected",
            Self::Failed { .. } => "failed",
        }
    }

    /// SVG size or the error message.
    pub fn detail(&self) -> String {
        match self {
            Self::Converted { svg_bytes } => format!("{svg_bytes} bytes"),
            Self::Rejected { message } | Self::Failed { message } => {
                message.lines().next().unwrap_or_default().to_string()
            }
        }
    }
}

/// One line of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// 1-based line number in the input.
    pub line: usize,
    pub format: InputFormat,
    pub font: String,
    pub millis: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl BatchOutcome {
    pub fn new(line: usize, equation: &Equation, elapsed: Duration, outcome: Outcome) -> Self {
        Self {
            line,
            format: equation.format(),
            font: equation.font().to_string(),
            millis: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
            outcome,
        }
    }
}

/// Everything a batch run reports.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<BatchOutcome>,
    pub status: PoolStatus,
}

impl BatchReport {
    pub fn count(&self, label: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }
}

/// Format and print a batch report.
pub fn print_report(report: &BatchReport, format: OutputFormat, options: TableOptions) {
    match format {
        OutputFormat::Table => table::print_table(report, options),
        OutputFormat::Json => json::print_json(report),
        OutputFormat::Plain => plain::print_plain(report),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_error() {
        let rejected = Outcome::from_error(&PoolError::Conversion("bad".into()));
        assert_eq!(rejected.label(), "rejected");

        let failed =
            Outcome::from_error(&PoolError::transport("closed").with_stderr("trace".into()));
        assert_eq!(failed.label(), "failed");
        // Only the first line of a multi-line message is shown.
        assert_eq!(failed.detail(), "Renderer transport failure: closed");
    }

    #[test]
    fn test_report_counts() {
        let report = fixtures::report();
        assert_eq!(report.count("converted"), 1);
        assert_eq!(report.count("rejected"), 1);
        assert_eq!(report.count("failed"), 0);
    }
}
