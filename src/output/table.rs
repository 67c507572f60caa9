//! Colored table output for batch reports.

use crate::output::{BatchReport, Outcome, TableOptions};
use crate::telemetry::PoolStatus;
use crate::theme::{Semantic, ThemedCell};
use comfy_table::{
    Cell, ContentArrangement, Table,
    presets::{ASCII_FULL, UTF8_FULL},
};

fn new_table(options: TableOptions) -> Table {
    let mut table = Table::new();
    if options.ascii {
        table.load_preset(ASCII_FULL);
    } else {
        table.load_preset(UTF8_FULL);
    }
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Per-equation results.
pub fn results_table(report: &BatchReport, options: TableOptions) -> Table {
    let mut table = new_table(options);
    table.set_header(vec!["Line", "Format", "Font", "Outcome", "Detail", "ms"]);

    for result in &report.results {
        let semantic = match result.outcome {
            Outcome::Converted { .. } => Semantic::Converted,
            Outcome::Rejected { .. } => Semantic::Rejected,
            Outcome::Failed { .. } => Semantic::Failed,
        };
        table.add_row(vec![
            Cell::new(result.line),
            Cell::new(result.format).themed(Semantic::Value),
            Cell::new(&result.font),
            Cell::new(result.outcome.label()).themed(semantic),
            Cell::new(result.outcome.detail()),
            Cell::new(result.millis),
        ]);
    }
    table
}

/// Pool counters and recent errors.
pub fn status_table(status: &PoolStatus, options: TableOptions) -> Table {
    let mut table = new_table(options);
    table.set_header(vec!["Metric", "Value"]);

    let mean = status
        .mean_millis()
        .map_or_else(|| "-".to_string(), |ms| format!("{ms} ms"));
    let rows = [
        ("Cache hits", status.cache_hits.to_string()),
        ("Cache misses", status.cache_misses.to_string()),
        ("Errors", status.error_count.to_string()),
        ("Instances", status.instances.to_string()),
        ("Idle instances", status.idle.to_string()),
        ("Mean processing time", mean),
    ];
    for (metric, value) in rows {
        table.add_row(vec![Cell::new(metric), Cell::new(value).themed(Semantic::Value)]);
    }

    for record in &status.errors {
        let repeat = if record.count > 1 {
            format!(" (x{})", record.count)
        } else {
            String::new()
        };
        table.add_row(vec![
            Cell::new(record.at.format("%H:%M:%S").to_string()).themed(Semantic::Failed),
            Cell::new(format!("{}: {}{}", record.equation, record.detail, repeat)),
        ]);
    }
    table
}

pub fn print_table(report: &BatchReport, options: TableOptions) {
    if report.results.is_empty() {
        println!("No equations converted.");
    } else {
        println!("{}", results_table(report, options));
    }
    println!("{}", status_table(&report.status, options));
}
