use ddrcheck_core::cancel::CancellationToken;
use ddrcheck_core::engine::{ControllerEvent, ControllerState, TestController, ABORTED_MESSAGE};
use ddrcheck_core::model::{ErrorMap, TestStatus};
use ddrcheck_core::scope::ScopeStore;
use ddrcheck_core::storage::ExtractorFile;
use ddrcheck_core::validators_api::{Validation, Validator, ValidatorRegistry};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

struct Sleepy;

impl Validator for Sleepy {
    fn name(&self) -> &'static str {
        "sleepy"
    }

    fn validate(
        &self,
        _file: &ExtractorFile,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Validation> {
        std::thread::sleep(Duration::from_millis(20));
        if cancel.is_cancelled() {
            return Ok(Validation::Aborted);
        }
        Ok(Validation::ok())
    }
}

/// Flags file `B`, passes the rest.
struct Picky;

impl Validator for Picky {
    fn name(&self) -> &'static str {
        "picky"
    }

    fn validate(
        &self,
        file: &ExtractorFile,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Validation> {
        let mut errors = ErrorMap::new();
        if file.name() == "B" {
            errors.push("X", "Not numeric", Some(3), Some("abc".into()));
        }
        Ok(Validation::Completed(errors))
    }
}

struct Panicky;

impl Validator for Panicky {
    fn name(&self) -> &'static str {
        "panicky"
    }

    fn validate(
        &self,
        _file: &ExtractorFile,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Validation> {
        panic!("validator blew up");
    }
}

fn sleepy() -> Arc<dyn Validator> {
    Arc::new(Sleepy)
}

fn picky() -> Arc<dyn Validator> {
    Arc::new(Picky)
}

fn panicky() -> Arc<dyn Validator> {
    Arc::new(Panicky)
}

fn controller(registry: ValidatorRegistry, concurrency: usize) -> (TempDir, TestController) {
    let dir = tempdir().unwrap();
    let scopes = dir.path().join("scopes");
    for f in ["C", "A", "B"] {
        std::fs::create_dir_all(scopes.join("S/V").join(f)).unwrap();
    }
    let mut ctl = TestController::new(ScopeStore::new(scopes), registry).with_concurrency(concurrency);
    ctl.build_pending_matrix("S", "V", &dir.path().join("in"))
        .unwrap();
    (dir, ctl)
}

fn two_tests() -> ValidatorRegistry {
    let mut reg = ValidatorRegistry::new();
    reg.register("sleepy", sleepy).register("picky", picky);
    reg
}

async fn drain(ctl: &mut TestController) -> Vec<ControllerEvent> {
    let mut events = Vec::new();
    while let Some(ev) = ctl.next_event().await {
        events.push(ev);
    }
    events
}

fn count_finished(events: &[ControllerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ControllerEvent::RunFinished))
        .count()
}

fn completed(events: &[ControllerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ControllerEvent::ItemCompleted { .. }))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runs_the_whole_matrix_once() {
    let (_dir, mut ctl) = controller(two_tests(), 2);
    assert_eq!(ctl.files().iter().map(|f| f.name()).collect::<Vec<_>>(), vec!["A", "B", "C"]);
    assert_eq!(ctl.test_names(), vec!["sleepy", "picky"]);
    assert!(ctl.start());
    assert!(!ctl.start(), "second start while running is refused");

    let events = drain(&mut ctl).await;
    assert_eq!(completed(&events), 6);
    assert_eq!(count_finished(&events), 1);
    assert_eq!(events.last(), Some(&ControllerEvent::RunFinished));
    assert!(events.contains(&ControllerEvent::Progress { executed: 6, total: 6 }));
    assert_eq!(ctl.state(), ControllerState::Finished);

    assert_eq!(ctl.test(0, 1).unwrap().status(), TestStatus::Ok);
    let b = ctl.test(1, 1).unwrap().snapshot();
    assert_eq!(b.status, TestStatus::Error);
    assert_eq!(b.errors.get("X", "Not numeric").len(), 1);
    assert!(b.log.last().unwrap().contains("finished in"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_lets_in_flight_finish_and_resume_completes() {
    let (_dir, mut ctl) = controller(two_tests(), 2);
    assert!(ctl.start());
    assert!(ctl.pause());

    let first = drain(&mut ctl).await;
    assert_eq!(completed(&first), 2);
    assert_eq!(count_finished(&first), 0);
    assert_eq!(ctl.state(), ControllerState::Paused);
    assert_eq!(ctl.progress().executed(), 2);
    let pending = ctl
        .matrix()
        .iter()
        .flatten()
        .filter(|t| t.status() == TestStatus::Pending)
        .count();
    assert_eq!(pending, 4);

    assert!(ctl.resume());
    let rest = drain(&mut ctl).await;
    assert_eq!(completed(&rest), 4);
    assert_eq!(count_finished(&rest), 1);
    assert_eq!(ctl.progress().executed(), 6);
    assert_eq!(ctl.state(), ControllerState::Finished);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abort_then_idle_reenqueue_runs_just_that_row() {
    let (_dir, mut ctl) = controller(two_tests(), 1);
    assert!(ctl.start());
    assert!(ctl.abort());
    assert!(!ctl.pause());

    let aborted = drain(&mut ctl).await;
    assert_eq!(count_finished(&aborted), 0);
    assert_eq!(completed(&aborted), 1);
    assert_eq!(ctl.state(), ControllerState::Aborted);
    let first = ctl.test(0, 0).unwrap().snapshot();
    assert_eq!(first.status, TestStatus::Warning);
    assert!(first.log.iter().any(|l| l == ABORTED_MESSAGE));
    assert_eq!(ctl.test(2, 1).unwrap().status(), TestStatus::Pending);

    assert!(ctl.reenqueue_row(0));
    assert_eq!(ctl.state(), ControllerState::Running);
    let rerun = drain(&mut ctl).await;
    assert_eq!(completed(&rerun), 2);
    assert_eq!(count_finished(&rerun), 1);
    assert_eq!(ctl.progress().total(), 2);
    assert_eq!(ctl.test(0, 0).unwrap().status(), TestStatus::Ok);
    assert_eq!(ctl.test(0, 1).unwrap().status(), TestStatus::Ok);
    assert_eq!(ctl.test(1, 0).unwrap().status(), TestStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reenqueue_into_active_run_grows_total() {
    let (_dir, mut ctl) = controller(two_tests(), 1);
    assert!(ctl.start());
    assert!(ctl.reenqueue_test(2, 1));
    assert!(!ctl.reenqueue_test(9, 0));
    assert_eq!(ctl.progress().total(), 7);

    let events = drain(&mut ctl).await;
    assert_eq!(count_finished(&events), 1);
    assert!(events.contains(&ControllerEvent::Progress { executed: 7, total: 7 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_worker_is_an_error_and_still_counts() {
    let mut reg = ValidatorRegistry::new();
    reg.register("panicky", panicky);
    let (_dir, mut ctl) = controller(reg, 2);
    assert!(ctl.start());

    let events = drain(&mut ctl).await;
    assert_eq!(count_finished(&events), 1);
    assert_eq!(ctl.progress().executed(), 3);
    for row in 0..3 {
        let state = ctl.test(row, 0).unwrap().snapshot();
        assert_eq!(state.status, TestStatus::Error);
        assert!(state.log[0].starts_with("worker failed"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rebuilding_drops_the_old_run() {
    let (dir, mut ctl) = controller(two_tests(), 2);
    assert!(ctl.start());
    ctl.build_pending_matrix("S", "V", &dir.path().join("in"))
        .unwrap();
    assert_eq!(ctl.state(), ControllerState::Idle);

    let stale = drain(&mut ctl).await;
    assert!(stale.is_empty());
    assert!(ctl
        .matrix()
        .iter()
        .flatten()
        .all(|t| t.status() == TestStatus::Pending));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_waits_for_in_flight_work() {
    let (_dir, mut ctl) = controller(two_tests(), 2);
    assert!(ctl.start());
    let left = ctl.shutdown(Duration::from_secs(5)).await;
    assert_eq!(left, 0);
    assert_eq!(ctl.in_flight(), 0);
    assert_eq!(ctl.state(), ControllerState::Aborted);
}

#[tokio::test]
async fn empty_matrix_does_not_start() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("S/V")).unwrap();
    let mut ctl = TestController::new(ScopeStore::new(dir.path()), two_tests());
    ctl.build_pending_matrix("S", "V", dir.path()).unwrap();
    assert!(!ctl.start());
    assert_eq!(ctl.next_event().await, None);
}

#[test]
fn lists_scopes_and_versions() {
    let (_dir, ctl) = controller(two_tests(), 1);
    assert_eq!(ctl.load_scopes().unwrap(), vec!["S"]);
    assert_eq!(ctl.load_versions("S").unwrap(), vec!["V"]);
    assert_eq!(ctl.files().len(), 3);
}
