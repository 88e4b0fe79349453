mod util;

use repo_index::indexer::document::fields;
use repo_index::indexer::{IndexerOptions, ReindexError, ReindexStage};
use repo_index::model::{ContainerNode, EntityRef};
use repo_index::repository::Snapshot;
use repo_index::search::client::{IndexClientError, MATCH_ALL};
use repo_index::search::memory::{IndexOp, OpKind};
use serde_json::json;
use util::{RecordBuilder, TestTracing, container, harness, harness_with, sample_snapshot};

#[test]
fn full_reindex_indexes_every_entity_once() {
    let h = harness(sample_snapshot());
    let summary = h.indexer.index_all().unwrap();

    assert_eq!(summary.containers, 3);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.files, 3);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.to_string(), "3 containers and 3 records indexed");

    assert_eq!(h.index.count_type("dataverses"), 3);
    assert_eq!(h.index.count_type("datasets"), 3);
    assert_eq!(h.index.count_type("files"), 3);
    assert!(h.index.get("dataverse_1").is_none(), "root is skipped");
}

#[test]
fn full_reindex_clears_then_commits_before_entities() {
    let h = harness(sample_snapshot());
    h.index.seed([repo_index::indexer::document::IndexDocument::new(
        repo_index::model::EntityKind::Record,
        999,
    )]);
    h.indexer.index_all().unwrap();

    let ops = h.index.ops();
    assert_eq!(ops[0], IndexOp::DeleteByQuery(MATCH_ALL.to_string()));
    assert_eq!(ops[1], IndexOp::Commit);
    // every entity gets its own add + commit
    assert!(ops[2..].chunks(2).all(|pair| matches!(pair, [IndexOp::Add(_), IndexOp::Commit])));
    assert!(h.index.get("dataset_999").is_none(), "stale documents are gone");
}

#[test]
fn record_document_carries_paths_metadata_and_parent() {
    let h = harness(sample_snapshot());
    h.indexer.index_all().unwrap();

    let doc = h.index.get("dataset_10").unwrap();
    assert_eq!(doc.get(fields::SUBTREE), Some(&json!(["/econ", "/econ/surveys"])));
    assert_eq!(doc.get(fields::PARENT_TYPE), Some(&json!("dataverses")));
    assert_eq!(doc.get(fields::PARENT_ID), Some(&json!(3)));
    assert_eq!(doc.get(fields::PARENT_NAME), Some(&json!("Surveys Collection")));
    assert_eq!(doc.get(fields::TITLE), Some(&json!("Household Survey 2019")));
    assert_eq!(doc.get(fields::AUTHOR_STRING), Some(&json!("Smith, Jane")));
    assert_eq!(doc.get(fields::KEYWORD), Some(&json!(["income", "households"])));
    assert_eq!(doc.get(fields::PRODUCTION_DATE_YEAR_ONLY), Some(&json!(2019)));
    assert_eq!(
        doc.get(fields::PRODUCTION_DATE_ORIGINAL),
        Some(&json!("2019-01-01T00:00:00Z"))
    );
}

#[test]
fn released_record_is_indexed_with_its_metadata() {
    let h = harness(sample_snapshot());
    h.indexer.index_record(12).unwrap();

    let doc = h.index.get("dataset_12").unwrap();
    assert_eq!(doc.get(fields::TITLE), Some(&json!("Trade Flows")));
    assert_eq!(doc.get(fields::PARENT_ID), Some(&json!(2)));
}

#[test]
fn file_documents_link_to_their_record() {
    let h = harness(sample_snapshot());
    h.indexer.index_all().unwrap();

    let csv = h.index.get("datafile_100").unwrap();
    assert_eq!(csv.get(fields::FILE_TYPE_GROUP), Some(&json!("text")));
    assert_eq!(csv.get(fields::PARENT_TYPE), Some(&json!("datasets")));
    assert_eq!(csv.get(fields::PARENT_ID), Some(&json!(10)));
    assert_eq!(csv.get(fields::PARENT_NAME), Some(&json!("Household Survey 2019")));
    assert_eq!(csv.get(fields::SUBTREE), Some(&json!(["/econ", "/econ/surveys"])));

    let h5 = h.index.get("datafile_110").unwrap();
    assert_eq!(h5.get(fields::FILE_TYPE_GROUP), Some(&json!("application")));
}

#[test]
fn container_paths_include_own_segment() {
    let h = harness(sample_snapshot());
    h.indexer.index_all().unwrap();

    let surveys = h.index.get("dataverse_3").unwrap();
    assert_eq!(surveys.get(fields::SUBTREE), Some(&json!(["/econ", "/econ/surveys"])));
    assert_eq!(surveys.get(fields::PARENT_ID), Some(&json!(2)));

    let physics = h.index.get("dataverse_4").unwrap();
    assert_eq!(physics.get(fields::SUBTREE), Some(&json!(["/physics"])));
    assert_eq!(physics.get(fields::PARENT_NAME), Some(&json!("Root Collection")));
}

#[test]
fn root_is_indexed_when_configured() {
    let h = harness_with(
        sample_snapshot(),
        IndexerOptions {
            index_root_container: true,
            ..IndexerOptions::default()
        },
    );
    let summary = h.indexer.index_all().unwrap();
    assert_eq!(summary.containers, 4);
    let root = h.index.get("dataverse_1").unwrap();
    assert_eq!(root.get(fields::SUBTREE), Some(&json!([])));
    assert!(!root.contains(fields::PARENT_TYPE));
}

#[test]
fn malformed_hierarchy_is_isolated_to_its_subtree() {
    let mut snapshot = sample_snapshot();
    // 5 and 6 own each other and never reach the root
    snapshot.containers.push(container(5, "loop-a", Some(6)));
    snapshot.containers.push(container(6, "loop-b", Some(5)));
    snapshot
        .records
        .push(RecordBuilder::new(13, 5).title("Orphaned").build());

    let h = harness(snapshot);
    let summary = h.indexer.index_all().unwrap();

    assert_eq!(summary.containers, 3);
    assert_eq!(summary.records, 3);
    let failed: Vec<EntityRef> = summary.failures.iter().filter_map(|f| f.entity).collect();
    assert_eq!(
        failed,
        vec![
            EntityRef::container(5),
            EntityRef::container(6),
            EntityRef::record(13)
        ]
    );
    assert!(summary.failures.iter().all(|f| f.during == ReindexStage::Building));
    assert!(h.index.get("dataset_10").is_some());
}

#[test]
fn entities_without_ids_are_skipped_with_warning() {
    let tracing = TestTracing::new();
    let _guard = tracing.install();

    let mut snapshot = sample_snapshot();
    snapshot.containers.push(ContainerNode {
        id: None,
        ..container(0, "unsaved", Some(1))
    });
    let mut unsaved = RecordBuilder::new(0, 2).build();
    unsaved.id = None;
    snapshot.records.push(unsaved);

    let h = harness(snapshot);
    let summary = h.indexer.index_all().unwrap();
    assert_eq!(summary.skipped, 2);
    assert!(summary.failures.is_empty());
    tracing.assert_contains("skipping container with no id");
    tracing.assert_contains("skipping record with no id");
}

#[test]
fn connectivity_loss_interrupts_with_partial_summary() {
    let h = harness(sample_snapshot());
    // the clear succeeds; the first entity add hits a dead index
    h.index.fail_next(
        OpKind::Add,
        IndexClientError::IndexUnavailable("connection reset".into()),
    );

    match h.indexer.index_all() {
        Err(ReindexError::Interrupted { summary, source }) => {
            assert_eq!(summary.containers, 0);
            assert_eq!(source, IndexClientError::IndexUnavailable("connection reset".into()));
        }
        other => panic!("expected interruption, got {other:?}"),
    }
}

#[test]
fn rerunning_converges_to_same_index() {
    let h = harness(sample_snapshot());
    h.indexer.index_all().unwrap();
    let first = h.index.committed();

    h.indexer.index_record(10).unwrap();
    h.indexer.index_container(3).unwrap();
    h.indexer.index_all().unwrap();
    assert_eq!(h.index.committed(), first);
}

#[test]
fn empty_repository_yields_empty_index() {
    let h = harness(Snapshot {
        containers: vec![container(1, "root", None)],
        records: vec![],
    });
    let summary = h.indexer.index_all().unwrap();
    assert_eq!((summary.containers, summary.records), (0, 0));
    assert!(h.index.committed().is_empty());
}
