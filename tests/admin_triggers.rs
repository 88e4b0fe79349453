mod util;

use std::sync::Arc;
use std::time::Duration;

use repo_index::admin::{AdminApi, AdminError};
use repo_index::daemon::{JobResult, ReindexWorker, WorkerConfig};
use repo_index::remediation::RemediationLog;
use util::{harness, sample_snapshot};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn triggers_return_before_the_work_is_done() {
    let h = harness(sample_snapshot());
    let worker = ReindexWorker::start(
        h.indexer.clone(),
        Arc::new(RemediationLog::memory()),
        WorkerConfig::default(),
    )
    .unwrap();
    let api = AdminApi::new(h.repo.clone(), worker.clone());

    let full = api.trigger_full_reindex().unwrap();
    assert_eq!(full.to_json()["message"], "full reindex started");
    match full.ticket.wait_timeout(WAIT).unwrap().result {
        Ok(JobResult::Full(summary)) => assert_eq!(summary.records, 3),
        other => panic!("unexpected {other:?}"),
    }

    let record = api.trigger_record_reindex("doi:10.5072/FK2/R11").unwrap();
    assert!(record.ticket.wait_timeout(WAIT).unwrap().succeeded());

    let container = api.trigger_container_reindex(4).unwrap();
    assert!(container.ticket.wait_timeout(WAIT).unwrap().succeeded());
    worker.shutdown();
}

#[test]
fn bad_input_is_rejected_before_dispatch() {
    let h = harness(sample_snapshot());
    let worker = ReindexWorker::start(
        h.indexer.clone(),
        Arc::new(RemediationLog::memory()),
        WorkerConfig::default(),
    )
    .unwrap();
    let api = AdminApi::new(h.repo.clone(), worker.clone());

    assert!(matches!(api.trigger_record_reindex(""), Err(AdminError::BadRequest(_))));
    assert!(matches!(
        api.trigger_record_reindex("doi:10.5072/FK2/MISSING"),
        Err(AdminError::NotFound(_))
    ));
    assert!(matches!(api.trigger_container_reindex(77), Err(AdminError::NotFound(_))));
    worker.shutdown();
    assert!(h.index.ops().is_empty());
}

#[test]
fn stopped_workers_surface_as_dispatch_errors() {
    let h = harness(sample_snapshot());
    let worker = ReindexWorker::start(
        h.indexer.clone(),
        Arc::new(RemediationLog::memory()),
        WorkerConfig::default(),
    )
    .unwrap();
    let api = AdminApi::new(h.repo.clone(), worker.clone());
    worker.shutdown();
    assert!(matches!(api.trigger_full_reindex(), Err(AdminError::Dispatch(_))));
}
