use super::errors::render_tree;
use super::RunReport;
use crate::model::TestStatus;

fn icon(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Ok => "✅",
        TestStatus::Error => "❌",
        TestStatus::Warning => "⚠️ ",
        TestStatus::Pending => "⏳",
    }
}

/// Prints the matrix, one line per cell, followed by the totals.
pub fn print_summary(report: &RunReport, show_errors: bool, max_lines: usize) {
    eprintln!(
        "\nScope {} / {}: {} files x {} tests",
        report.scope,
        report.version,
        report.files.len(),
        report.tests.len()
    );

    for cell in &report.cells {
        let duration = cell
            .duration_ms
            .map(|d| format!("({:.1}s)", d as f64 / 1000.0))
            .unwrap_or_default();
        match cell.status {
            TestStatus::Error if !cell.errors.is_empty() => {
                eprintln!(
                    "{} {:<24} {:<8} {} violation(s)  {}",
                    icon(cell.status),
                    cell.file,
                    cell.test,
                    cell.errors.total(),
                    duration
                );
                if show_errors {
                    for line in render_tree(&cell.errors, max_lines) {
                        eprintln!("      {}", line);
                    }
                }
            }
            TestStatus::Error | TestStatus::Warning => {
                eprintln!(
                    "{} {:<24} {:<8} {}",
                    icon(cell.status),
                    cell.file,
                    cell.test,
                    cell.status.label().to_uppercase()
                );
                // Last line is the timing line; the reason precedes it.
                if let Some(reason) = cell.log.first() {
                    eprintln!("      {}", reason);
                }
            }
            _ => {
                eprintln!(
                    "{} {:<24} {:<8} {}",
                    icon(cell.status),
                    cell.file,
                    cell.test,
                    duration
                );
            }
        }
    }

    let c = report.counts();
    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let aborted = if report.aborted { " (aborted)" } else { "" };
    eprintln!(
        "Summary: {} ok, {} error, {} warning, {} pending{}",
        c.ok, c.error, c.warning, c.pending, aborted
    );
}
