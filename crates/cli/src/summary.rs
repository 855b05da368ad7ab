// Human-readable run summary (stderr)

use std::fmt::Write;

use idrecon_io::ReportOutcome;
use idrecon_recon::{Category, ReconSummary};

/// Counts per category and the total, one line each.
pub fn render(summary: &ReconSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "divergences: {} ({} distinct tax IDs)", summary.total, summary.distinct_keys);
    for category in Category::ALL {
        let _ = writeln!(
            out,
            "  {:<20} {:>7}  {}",
            category.sheet_name(),
            summary.count(category),
            category.description()
        );
    }
    if summary.malformed_keys > 0 {
        let _ = writeln!(out, "  {} record(s) with a tax ID lacking digits", summary.malformed_keys);
    }
    out
}

/// Written files, then failures.
pub fn render_outcome(outcome: &ReportOutcome) -> String {
    let mut out = String::new();
    for path in &outcome.written {
        let _ = writeln!(out, "wrote {}", path.display());
    }
    for failure in &outcome.failures {
        let _ = writeln!(out, "failed {}", failure);
    }
    out
}
