use crate::cancel::CancellationToken;
use crate::errors::find_loader_error;
use crate::model::{ErrorMap, TestStatus};
use crate::storage::ExtractorFile;
use crate::validators_api::{Validation, Validator};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub const ABORTED_MESSAGE: &str = "Test aborted by user.";

#[derive(Debug, Clone, Default)]
pub struct TestState {
    pub status: TestStatus,
    pub log: Vec<String>,
    pub errors: ErrorMap,
    pub duration_ms: Option<u64>,
}

/// One validator bound to one file: a cell of the matrix.
pub struct TestInstance {
    validator: Arc<dyn Validator>,
    file: Arc<ExtractorFile>,
    state: Mutex<TestState>,
    epoch: AtomicU64,
}

impl TestInstance {
    pub fn new(validator: Arc<dyn Validator>, file: Arc<ExtractorFile>) -> Self {
        Self {
            validator,
            file,
            state: Mutex::new(TestState::default()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.validator.name()
    }

    pub fn file(&self) -> &Arc<ExtractorFile> {
        &self.file
    }

    pub fn status(&self) -> TestStatus {
        self.lock().status
    }

    /// Copy of the current status, log, errors and duration.
    pub fn snapshot(&self) -> TestState {
        self.lock().clone()
    }

    /// Back to pending. A run already in flight will not overwrite this.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.lock() = TestState::default();
    }

    /// Runs the validator and records the outcome. Never fails: every error
    /// becomes an `error` or `warning` status with the message in the log.
    pub fn run(&self, cancel: &CancellationToken) -> TestStatus {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut log = Vec::new();

        if cancel.is_cancelled() {
            log.push(ABORTED_MESSAGE.to_string());
            return self.commit(epoch, TestStatus::Warning, log, ErrorMap::new(), None);
        }

        let started = Instant::now();
        let outcome = self.validator.validate(&self.file, cancel);
        let duration_ms = started.elapsed().as_millis() as u64;

        let (status, errors) = match outcome {
            Ok(Validation::Completed(errors)) if errors.is_empty() => (TestStatus::Ok, errors),
            Ok(Validation::Completed(errors)) => {
                log.push(format!(
                    "{} violation(s) in {} field(s).",
                    errors.total(),
                    errors.field_count()
                ));
                (TestStatus::Error, errors)
            }
            Ok(Validation::Aborted) => {
                log.push(ABORTED_MESSAGE.to_string());
                (TestStatus::Warning, ErrorMap::new())
            }
            Err(e) => {
                let soft = find_loader_error(&e).map(|le| le.is_soft()).unwrap_or(false);
                log.push(format!("{:#}", e));
                let status = if soft {
                    TestStatus::Warning
                } else {
                    TestStatus::Error
                };
                (status, ErrorMap::new())
            }
        };
        log.push(format!(
            "{} on {} finished in {:.3}s.",
            self.name(),
            self.file.name(),
            duration_ms as f64 / 1000.0
        ));

        tracing::debug!(
            event = "test_finished",
            test = self.name(),
            file = %self.file.name(),
            status = %status,
            duration_ms,
        );
        self.commit(epoch, status, log, errors, Some(duration_ms))
    }

    /// Current reset generation; changes on every [`reset`](Self::reset).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Records a worker that died without reporting (panic, cancelled task).
    pub fn record_failure(&self, epoch: u64, message: String) -> TestStatus {
        self.commit(epoch, TestStatus::Error, vec![message], ErrorMap::new(), None)
    }

    fn commit(
        &self,
        epoch: u64,
        status: TestStatus,
        log: Vec<String>,
        errors: ErrorMap,
        duration_ms: Option<u64>,
    ) -> TestStatus {
        let mut state = self.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return state.status;
        }
        state.status = status;
        state.log.extend(log);
        state.errors = errors;
        state.duration_ms = duration_ms;
        status
    }

    fn lock(&self) -> MutexGuard<'_, TestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TestInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestInstance")
            .field("validator", &self.name())
            .field("file", &self.file.name())
            .field("status", &self.status())
            .finish()
    }
}
