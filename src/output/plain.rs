//! Plain text output for batch reports (tab-separated, no colors).

use crate::output::BatchReport;
use std::fmt::Write;

pub fn render_plain(report: &BatchReport) -> String {
    let mut out = String::new();
    out.push_str("LINE\tFORMAT\tFONT\tOUTCOME\tDETAIL\tMS\n");
    for r in &report.results {
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            r.line,
            r.format,
            r.font,
            r.outcome.label(),
            r.outcome.detail(),
            r.millis
        );
    }

    let status = &report.status;
    let _ = writeln!(out, "cache_hits\t{}", status.cache_hits);
    let _ = writeln!(out, "cache_misses\t{}", status.cache_misses);
    let _ = writeln!(out, "errors\t{}", status.error_count);
    let _ = writeln!(out, "instances\t{}", status.instances);
    let _ = writeln!(out, "idle\t{}", status.idle);
    out
}

pub fn print_plain(report: &BatchReport) {
    print!("{}", render_plain(report));
}
