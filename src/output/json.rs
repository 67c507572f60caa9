//! JSON output for batch reports.

use crate::output::BatchReport;

pub fn render_json(report: &BatchReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

/// Print a batch report as JSON.
pub fn print_json(report: &BatchReport) {
    println!("{}", render_json(report));
}
