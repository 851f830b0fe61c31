//! Integration tests for the file-backed execution state store.

use gantry::error::GantryError;
use gantry::state::{
    ExecutionStateStore, FileStateStore, Run, RunId, RunStatus, SkipReason, StepResult,
    StepStatus,
};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn finished(step: &str, status: StepStatus) -> StepResult {
    let mut result = StepResult::pending(step);
    result.transition(StepStatus::Running).unwrap();
    result.transition(status).unwrap();
    result.attempts = 1;
    result
}

fn saved_run(store: &FileStateStore, targets: &[&str]) -> Run {
    let mut run = Run::new(targets.iter().map(|t| t.to_string()).collect());
    run.order = run.targets.clone();
    store.save_run(&run).unwrap();
    run
}

#[test]
fn results_survive_reopening_the_store() {
    let temp = TempDir::new().unwrap();
    let run = {
        let store = FileStateStore::new(temp.path());
        let run = saved_run(&store, &["provision"]);
        let mut result = finished("provision", StepStatus::Succeeded);
        result.fingerprint = Some("abc123".to_string());
        result.outputs = BTreeMap::from([("login_server".to_string(), "acr.io".to_string())]);
        store.put(&run.id, "provision", &result).unwrap();
        run
    };

    let reopened = FileStateStore::new(temp.path());
    let stored = reopened.get(&run.id, "provision").unwrap().unwrap();
    assert_eq!(stored.status, StepStatus::Succeeded);
    assert_eq!(stored.outputs["login_server"], "acr.io");

    let last = reopened.last_success("provision").unwrap().unwrap();
    assert_eq!(last.fingerprint.as_deref(), Some("abc123"));
}

#[test]
fn failure_does_not_replace_last_success() {
    let temp = TempDir::new().unwrap();
    let store = FileStateStore::new(temp.path());

    let first = saved_run(&store, &["push"]);
    store
        .put(&first.id, "push", &finished("push", StepStatus::Succeeded))
        .unwrap();

    let second = saved_run(&store, &["push"]);
    store
        .put(&second.id, "push", &finished("push", StepStatus::Failed))
        .unwrap();

    assert_eq!(
        store.get(&second.id, "push").unwrap().unwrap().status,
        StepStatus::Failed
    );
    assert_eq!(
        store.last_success("push").unwrap().unwrap().status,
        StepStatus::Succeeded
    );
    assert_eq!(
        store.last_outcome("push").unwrap().unwrap().status,
        StepStatus::Failed
    );
}

#[test]
fn skips_do_not_change_last_outcome() {
    let temp = TempDir::new().unwrap();
    let store = FileStateStore::new(temp.path());

    let first = saved_run(&store, &["build"]);
    store
        .put(&first.id, "build", &finished("build", StepStatus::Succeeded))
        .unwrap();

    let second = saved_run(&store, &["build"]);
    let mut skipped = StepResult::pending("build");
    skipped
        .transition(StepStatus::Skipped {
            reason: SkipReason::Cancelled,
        })
        .unwrap();
    store.put(&second.id, "build", &skipped).unwrap();

    let reopened = FileStateStore::new(temp.path());
    assert_eq!(
        reopened.last_outcome("build").unwrap().unwrap().status,
        StepStatus::Succeeded
    );
}

#[test]
fn run_results_follow_run_order() {
    let temp = TempDir::new().unwrap();
    let store = FileStateStore::new(temp.path());
    let mut run = Run::new(vec!["deploy".to_string()]);
    run.order = vec!["build".to_string(), "push".to_string(), "deploy".to_string()];
    store.save_run(&run).unwrap();

    for step in ["deploy", "build", "push"] {
        store
            .put(&run.id, step, &finished(step, StepStatus::Succeeded))
            .unwrap();
    }

    let steps: Vec<String> = store
        .run_results(&run.id)
        .unwrap()
        .into_iter()
        .map(|r| r.step)
        .collect();
    assert_eq!(steps, ["build", "push", "deploy"]);
}

#[test]
fn finished_run_round_trips() {
    let temp = TempDir::new().unwrap();
    let store = FileStateStore::new(temp.path());
    let mut run = saved_run(&store, &["deploy"]);
    run.finish(RunStatus::Failed);
    store.save_run(&run).unwrap();

    let loaded = store.load_run(&run.id).unwrap().unwrap();
    assert_eq!(loaded.status, RunStatus::Failed);
    assert!(loaded.finished_at.is_some());
    assert_eq!(store.list_runs().unwrap().len(), 1);
}

#[test]
fn missing_and_malformed_runs() {
    let temp = TempDir::new().unwrap();
    let store = FileStateStore::new(temp.path());

    assert!(store
        .load_run(&RunId::new("20200101T000000Z-00000000"))
        .unwrap()
        .is_none());
    assert!(store.list_runs().unwrap().is_empty());

    let err = store.load_run(&RunId::new("../escape")).unwrap_err();
    assert!(matches!(err, GantryError::UnknownRun { .. }));
}

#[test]
fn prune_keeps_newest_runs() {
    let temp = TempDir::new().unwrap();
    let store = FileStateStore::new(temp.path());
    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(saved_run(&store, &["build"]).id);
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let removed = store.prune(2).unwrap();

    assert_eq!(removed, 2);
    let kept: Vec<RunId> = store.list_runs().unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(kept, [ids[3].clone(), ids[2].clone()]);
}
