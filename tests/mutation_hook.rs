mod util;

use std::sync::Arc;
use std::time::Duration;

use repo_index::commands::{
    CommandEngine, CommandError, Permission, ReindexHook, SetExternalStatusCommand, User,
};
use repo_index::daemon::{ReindexWorker, ReindexWorkerHandle, RetryPolicy, WorkerConfig};
use repo_index::model::EntityRef;
use repo_index::remediation::RemediationLog;
use repo_index::repository::Repository;
use repo_index::search::client::IndexClientError;
use repo_index::search::memory::OpKind;
use tempfile::TempDir;
use util::{Harness, harness, sample_snapshot};

const WAIT: Duration = Duration::from_secs(5);

fn engine(
    h: &Harness,
    remediation: Arc<RemediationLog>,
    retries: u32,
) -> (CommandEngine, ReindexWorkerHandle) {
    let worker = ReindexWorker::start(
        h.indexer.clone(),
        remediation.clone(),
        WorkerConfig {
            threads: 1,
            retry: RetryPolicy {
                retries,
                backoff: Duration::from_millis(1),
            },
        },
    )
    .unwrap();
    let engine = CommandEngine::new(h.repo.clone(), ReindexHook::new(worker.clone(), remediation));
    (engine, worker)
}

fn curator() -> User {
    User::new("curator", [Permission::EditRecord])
}

#[test]
fn status_change_is_persisted_then_reindexed() {
    let h = harness(sample_snapshot());
    let remediation = Arc::new(RemediationLog::memory());
    let (engine, worker) = engine(&h, remediation.clone(), 0);

    let outcome = engine
        .submit(&curator(), &SetExternalStatusCommand::new(10, "Curator Review"))
        .unwrap();
    assert!(outcome.index_dispatched);
    assert_eq!(outcome.tickets.len(), 1);
    for ticket in outcome.tickets {
        let report = ticket.wait_timeout(WAIT).expect("job finished");
        assert!(report.succeeded());
    }

    let stored = h.repo.record(10).unwrap().unwrap();
    assert_eq!(
        stored.latest_version.external_status_label.as_deref(),
        Some("Curator Review")
    );
    assert!(stored.last_indexed_at.is_some());
    assert!(h.index.get("dataset_10").is_some());
    assert!(h.index.get("datafile_101").is_some());
    assert!(remediation.entries().is_empty());
    worker.shutdown();
}

#[test]
fn index_failure_never_rolls_back_the_mutation() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("remediation.jsonl");
    let remediation = Arc::new(RemediationLog::file(&log_path));

    let h = harness(sample_snapshot());
    h.index.fail_next(
        OpKind::Add,
        IndexClientError::IndexProtocolError("undefined field".into()),
    );
    let (engine, worker) = engine(&h, remediation.clone(), 2);

    let outcome = engine
        .submit(&curator(), &SetExternalStatusCommand::new(11, "Needs Changes"))
        .unwrap();
    assert!(outcome.index_dispatched);
    let report = outcome
        .tickets
        .into_iter()
        .next()
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();
    assert!(!report.succeeded());
    // protocol errors are not retried
    assert_eq!(report.attempts, 1);

    let stored = h.repo.record(11).unwrap().unwrap();
    assert_eq!(
        stored.latest_version.external_status_label.as_deref(),
        Some("Needs Changes")
    );
    assert!(stored.last_indexed_at.is_none());

    let entries = remediation.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity, EntityRef::record(11));
    assert_eq!(entries[0].context, "SetExternalStatusCommand");
    assert!(entries[0].error.contains("undefined field"));
    assert_eq!(entries[0].remedy, "repo-index reindex-record --id 11");
    assert!(std::fs::read_to_string(&log_path).unwrap().contains("\"record\""));
    worker.shutdown();
}

#[test]
fn transient_outage_is_retried_by_the_worker() {
    let h = harness(sample_snapshot());
    h.index.fail_next(
        OpKind::Commit,
        IndexClientError::IndexUnavailable("503".into()),
    );
    let remediation = Arc::new(RemediationLog::memory());
    let (engine, worker) = engine(&h, remediation.clone(), 1);

    let outcome = engine
        .submit(&curator(), &SetExternalStatusCommand::new(10, "Ready"))
        .unwrap();
    let report = outcome.tickets.into_iter().next().unwrap().wait_timeout(WAIT).unwrap();
    assert!(report.succeeded());
    assert_eq!(report.attempts, 2);
    assert!(remediation.entries().is_empty());
    worker.shutdown();
}

#[test]
fn gating_failures_touch_neither_repository_nor_index() {
    let h = harness(sample_snapshot());
    let remediation = Arc::new(RemediationLog::memory());
    let (engine, worker) = engine(&h, remediation.clone(), 0);

    // record 12 is released
    let err = engine
        .submit(&curator(), &SetExternalStatusCommand::new(12, "Anything"))
        .unwrap_err();
    assert!(matches!(err, CommandError::IllegalState(_)));

    let err = engine
        .submit(&curator(), &SetExternalStatusCommand::new(10, "bad/label"))
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidLabel(_)));

    worker.shutdown();
    assert!(h.index.ops().is_empty());
    assert!(h.repo.record(10).unwrap().unwrap().modification_time.is_none());
    assert!(h.repo.record(12).unwrap().unwrap().modification_time.is_none());
    assert!(remediation.entries().is_empty());
}
