use super::test::TestInstance;
use crate::cancel::CancellationToken;
use crate::config::default_workers;
use crate::model::TestStatus;
use crate::scope::ScopeStore;
use crate::storage::{ContentCache, ExtractorFile};
use crate::validators_api::ValidatorRegistry;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Paused,
    Finished,
    Aborted,
}

impl ControllerState {
    fn run_active(self) -> bool {
        matches!(self, ControllerState::Running | ControllerState::Paused)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    ItemCompleted {
        row: usize,
        col: usize,
        status: TestStatus,
    },
    Progress {
        executed: usize,
        total: usize,
    },
    RunFinished,
}

/// Counters of the current run, readable from any thread.
#[derive(Debug, Default)]
pub struct RunProgress {
    executed: AtomicUsize,
    total: AtomicUsize,
}

impl RunProgress {
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn reset(&self, total: usize) {
        self.executed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    fn add_total(&self, n: usize) {
        self.total.fetch_add(n, Ordering::SeqCst);
    }

    fn record(&self) -> usize {
        self.executed.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug, Clone, Copy)]
struct WorkItem {
    row: usize,
    col: usize,
}

#[derive(Debug)]
struct Completion {
    matrix_epoch: u64,
    run_epoch: u64,
    test_epoch: u64,
    item: WorkItem,
    status: TestStatus,
}

/// Owns the (file x test) matrix and schedules its execution.
///
/// Work runs on the blocking pool, at most `concurrency` items at a time.
/// The caller drives the controller by awaiting [`next_event`](Self::next_event),
/// which also refills free worker slots.
pub struct TestController {
    store: ScopeStore,
    registry: ValidatorRegistry,
    concurrency: usize,
    content_cache: ContentCache,

    files: Vec<Arc<ExtractorFile>>,
    matrix: Vec<Vec<Arc<TestInstance>>>,
    matrix_epoch: u64,

    state: ControllerState,
    run_epoch: u64,
    cancel: CancellationToken,
    queue: VecDeque<WorkItem>,
    in_flight: usize,
    progress: Arc<RunProgress>,
    events: VecDeque<ControllerEvent>,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl TestController {
    pub fn new(store: ScopeStore, registry: ValidatorRegistry) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store,
            registry,
            concurrency: default_workers(),
            content_cache: ContentCache::default(),
            files: Vec::new(),
            matrix: Vec::new(),
            matrix_epoch: 0,
            state: ControllerState::Idle,
            run_epoch: 0,
            cancel: CancellationToken::new(),
            queue: VecDeque::new(),
            in_flight: 0,
            progress: Arc::new(RunProgress::default()),
            events: VecDeque::new(),
            tx,
            rx,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_content_cache(mut self, cache: ContentCache) -> Self {
        self.content_cache = cache;
        self
    }

    pub fn load_scopes(&self) -> anyhow::Result<Vec<String>> {
        self.store.list_scopes()
    }

    pub fn load_versions(&self, scope: &str) -> anyhow::Result<Vec<String>> {
        self.store.list_versions(scope)
    }

    /// Replaces the matrix with one row per expected file and one column
    /// per registered validator, all pending. An active run is aborted.
    pub fn build_pending_matrix(
        &mut self,
        scope: &str,
        version: &str,
        input_dir: &Path,
    ) -> anyhow::Result<()> {
        let names = self.store.expected_files(scope, version)?;
        if self.state.run_active() {
            self.abort();
        }

        self.matrix_epoch += 1;
        self.files = names
            .iter()
            .map(|name| {
                Arc::new(
                    ExtractorFile::new(&self.store, scope, version, name, input_dir)
                        .with_content_cache(self.content_cache.clone()),
                )
            })
            .collect();
        self.matrix = self
            .files
            .iter()
            .map(|file| {
                self.registry
                    .instantiate()
                    .into_iter()
                    .map(|v| Arc::new(TestInstance::new(v, file.clone())))
                    .collect()
            })
            .collect();

        self.state = ControllerState::Idle;
        self.queue.clear();
        self.events.clear();
        self.progress.reset(0);

        tracing::info!(
            event = "matrix_built",
            scope,
            version,
            input = %input_dir.display(),
            files = self.files.len(),
            tests = self.registry.len(),
        );
        Ok(())
    }

    pub fn files(&self) -> &[Arc<ExtractorFile>] {
        &self.files
    }

    pub fn test_names(&self) -> Vec<&'static str> {
        self.registry.ids()
    }

    pub fn matrix(&self) -> &[Vec<Arc<TestInstance>>] {
        &self.matrix
    }

    pub fn test(&self, row: usize, col: usize) -> Option<&Arc<TestInstance>> {
        self.matrix.get(row).and_then(|r| r.get(col))
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn progress(&self) -> Arc<RunProgress> {
        self.progress.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Queues every cell, file-major, and starts dispatching.
    /// Returns false if a run is already active or the matrix is empty.
    pub fn start(&mut self) -> bool {
        if self.state.run_active() || self.matrix.is_empty() {
            return false;
        }
        let mut items = Vec::new();
        for (row, tests) in self.matrix.iter().enumerate() {
            for (col, test) in tests.iter().enumerate() {
                test.reset();
                items.push(WorkItem { row, col });
            }
        }
        if items.is_empty() {
            return false;
        }
        self.begin_run(items);
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != ControllerState::Running {
            return false;
        }
        self.state = ControllerState::Paused;
        tracing::info!(event = "run_paused", in_flight = self.in_flight);
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != ControllerState::Paused {
            return false;
        }
        self.state = ControllerState::Running;
        tracing::info!(event = "run_resumed", queued = self.queue.len());
        self.dispatch();
        true
    }

    /// Drops queued work and signals in-flight validators to stop.
    pub fn abort(&mut self) -> bool {
        if !self.state.run_active() {
            return false;
        }
        self.cancel.cancel();
        let dropped = self.queue.len();
        self.queue.clear();
        self.state = ControllerState::Aborted;
        tracing::warn!(
            event = "run_aborted",
            dropped,
            in_flight = self.in_flight,
            "run aborted"
        );
        true
    }

    pub fn reenqueue_test(&mut self, row: usize, col: usize) -> bool {
        if self.test(row, col).is_none() {
            return false;
        }
        self.reenqueue(vec![WorkItem { row, col }]);
        true
    }

    pub fn reenqueue_row(&mut self, row: usize) -> bool {
        let Some(tests) = self.matrix.get(row) else {
            return false;
        };
        let items: Vec<WorkItem> = (0..tests.len()).map(|col| WorkItem { row, col }).collect();
        if items.is_empty() {
            return false;
        }
        self.reenqueue(items);
        true
    }

    fn reenqueue(&mut self, items: Vec<WorkItem>) {
        for item in &items {
            self.matrix[item.row][item.col].reset();
        }
        if self.state.run_active() {
            self.progress.add_total(items.len());
            self.queue.extend(items);
            self.dispatch();
        } else {
            self.begin_run(items);
        }
    }

    fn begin_run(&mut self, items: Vec<WorkItem>) {
        self.run_epoch += 1;
        self.cancel = CancellationToken::new();
        self.progress.reset(items.len());
        self.queue = items.into();
        self.state = ControllerState::Running;
        tracing::info!(
            event = "run_started",
            run = self.run_epoch,
            items = self.progress.total(),
            concurrency = self.concurrency,
        );
        self.dispatch();
    }

    /// Next event of the active run. Returns `None` once nothing is in
    /// flight and nothing more can be dispatched (finished, paused, aborted
    /// or idle).
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        loop {
            if let Some(ev) = self.events.pop_front() {
                return Some(ev);
            }
            self.dispatch();
            if let Some(ev) = self.events.pop_front() {
                return Some(ev);
            }
            if self.in_flight == 0 {
                return None;
            }
            let completion = self.rx.recv().await?;
            self.on_completion(completion);
        }
    }

    /// Aborts and waits up to `grace` for in-flight items.
    /// Returns how many were still running when it gave up.
    pub async fn shutdown(&mut self, grace: Duration) -> usize {
        self.abort();
        let deadline = tokio::time::Instant::now() + grace;
        while self.in_flight > 0 {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(c)) => self.on_completion(c),
                _ => break,
            }
        }
        if self.in_flight > 0 {
            tracing::warn!(
                event = "shutdown_timeout",
                in_flight = self.in_flight,
                "validators still running after grace period"
            );
        }
        self.in_flight
    }

    fn dispatch(&mut self) {
        if self.state != ControllerState::Running {
            return;
        }
        while self.in_flight < self.concurrency {
            let Some(item) = self.queue.pop_front() else {
                break;
            };
            self.spawn(item);
        }
        if self.queue.is_empty() && self.in_flight == 0 {
            self.state = ControllerState::Finished;
            self.events.push_back(ControllerEvent::RunFinished);
            tracing::info!(
                event = "run_finished",
                run = self.run_epoch,
                executed = self.progress.executed(),
                total = self.progress.total(),
            );
        }
    }

    fn spawn(&mut self, item: WorkItem) {
        let test = self.matrix[item.row][item.col].clone();
        let cancel = self.cancel.clone();
        let tx = self.tx.clone();
        let matrix_epoch = self.matrix_epoch;
        let run_epoch = self.run_epoch;
        let test_epoch = test.epoch();

        self.in_flight += 1;
        tokio::spawn(async move {
            let worker = test.clone();
            let status =
                match tokio::task::spawn_blocking(move || worker.run(&cancel)).await {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::error!(
                            event = "worker_failed",
                            test = test.name(),
                            file = %test.file().name(),
                            error = %e,
                        );
                        test.record_failure(test_epoch, format!("worker failed: {}", e))
                    }
                };
            let _ = tx.send(Completion {
                matrix_epoch,
                run_epoch,
                test_epoch,
                item,
                status,
            });
        });
    }

    fn on_completion(&mut self, c: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if c.matrix_epoch != self.matrix_epoch {
            return;
        }
        let current = c.test_epoch == self.matrix[c.item.row][c.item.col].epoch();
        if current {
            self.events.push_back(ControllerEvent::ItemCompleted {
                row: c.item.row,
                col: c.item.col,
                status: c.status,
            });
        }
        if c.run_epoch == self.run_epoch {
            let executed = self.progress.record();
            self.events.push_back(ControllerEvent::Progress {
                executed,
                total: self.progress.total(),
            });
        }
    }
}
