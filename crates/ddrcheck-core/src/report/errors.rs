use super::RunReport;
use crate::model::{ErrorMap, Violation};
use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_LINES: usize = 100;

fn describe(v: &Violation) -> String {
    match (v.line, &v.value) {
        (None, _) => "whole column".to_string(),
        (Some(line), Some(value)) => format!("line {}: {}", line, value),
        (Some(line), None) => format!("line {}: <null>", line),
    }
}

/// Indented field / kind / sample-line view. At most `max_lines` samples are
/// listed per kind, followed by an "... and N more" line.
pub fn render_tree(errors: &ErrorMap, max_lines: usize) -> Vec<String> {
    let mut out = Vec::new();
    for (field, kinds) in errors.iter() {
        out.push(field.clone());
        for (kind, violations) in kinds {
            out.push(format!("  {} ({})", kind, violations.len()));
            for v in violations.iter().take(max_lines) {
                out.push(format!("    {}", describe(v)));
            }
            if violations.len() > max_lines {
                out.push(format!("    ... and {} more", violations.len() - max_lines));
            }
        }
    }
    out
}

/// Every violation as `Field, Error type, Line, Value`.
pub fn write_csv<W: Write>(errors: &ErrorMap, out: W) -> anyhow::Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(["Field", "Error type", "Line", "Value"])?;
    for (field, kinds) in errors.iter() {
        for (kind, violations) in kinds {
            for v in violations {
                let line = v.line.map(|l| l.to_string()).unwrap_or_default();
                let value = v.value.as_deref().unwrap_or("");
                w.write_record([field.as_str(), kind.as_str(), line.as_str(), value])?;
            }
        }
    }
    w.flush()?;
    Ok(())
}

/// One `<file>_<test>_errors.csv` per cell with violations. Returns the
/// written paths.
pub fn export_run_errors(report: &RunReport, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut written = Vec::new();
    for cell in report.cells.iter().filter(|c| !c.errors.is_empty()) {
        let path = dir.join(format!("{}_{}_errors.csv", cell.file, cell.test));
        let file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        write_csv(&cell.errors, file)?;
        written.push(path);
    }
    tracing::info!(event = "errors_exported", dir = %dir.display(), files = written.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ErrorMap {
        let mut m = ErrorMap::new();
        for line in 1..=5 {
            m.push("AMOUNT", "Not decimal", Some(line), Some(format!("x{}", line)));
        }
        m.push("RATE", "Missing size or precision", None, None);
        m
    }

    #[test]
    fn tree_caps_samples_per_kind() {
        let lines = render_tree(&sample(), 2);
        assert_eq!(
            lines,
            vec![
                "AMOUNT",
                "  Not decimal (5)",
                "    line 1: x1",
                "    line 2: x2",
                "    ... and 3 more",
                "RATE",
                "  Missing size or precision (1)",
                "    whole column",
            ]
        );
    }

    #[test]
    fn csv_export_has_header_and_every_row() {
        let mut buf = Vec::new();
        write_csv(&sample(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Field,Error type,Line,Value");
        assert_eq!(lines[1], "AMOUNT,Not decimal,1,x1");
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[6], "RATE,Missing size or precision,,");
    }
}
