pub mod console;
pub mod errors;
pub mod json;

use crate::engine::TestController;
use crate::model::{ErrorMap, TestStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct CellReport {
    pub file: String,
    pub test: String,
    pub status: TestStatus,
    pub duration_ms: Option<u64>,
    pub log: Vec<String>,
    pub errors: ErrorMap,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub error: usize,
    pub warning: usize,
    pub pending: usize,
}

/// Snapshot of a matrix after (or during) a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scope: String,
    pub version: String,
    pub input: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub aborted: bool,
    pub tests: Vec<String>,
    pub files: Vec<String>,
    pub cells: Vec<CellReport>,
}

impl RunReport {
    pub fn from_controller(
        ctl: &TestController,
        scope: &str,
        version: &str,
        input: PathBuf,
        started_at: DateTime<Utc>,
        aborted: bool,
    ) -> Self {
        let mut cells = Vec::new();
        for tests in ctl.matrix() {
            for test in tests {
                let state = test.snapshot();
                cells.push(CellReport {
                    file: test.file().name().to_string(),
                    test: test.name().to_string(),
                    status: state.status,
                    duration_ms: state.duration_ms,
                    log: state.log,
                    errors: state.errors,
                });
            }
        }
        Self {
            scope: scope.to_string(),
            version: version.to_string(),
            input,
            started_at,
            finished_at: Utc::now(),
            aborted,
            tests: ctl.test_names().iter().map(|t| t.to_string()).collect(),
            files: ctl.files().iter().map(|f| f.name().to_string()).collect(),
            cells,
        }
    }

    pub fn counts(&self) -> StatusCounts {
        let mut c = StatusCounts::default();
        for cell in &self.cells {
            match cell.status {
                TestStatus::Ok => c.ok += 1,
                TestStatus::Error => c.error += 1,
                TestStatus::Warning => c.warning += 1,
                TestStatus::Pending => c.pending += 1,
            }
        }
        c
    }
}
