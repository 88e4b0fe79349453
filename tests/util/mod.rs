#![allow(dead_code)]

use std::sync::Arc;

use repo_index::indexer::{Indexer, IndexerOptions};
use repo_index::model::{
    ContainerNode, DataFile, FieldDefinition, FieldValue, Record, RecordVersion, VersionState,
};
use repo_index::repository::{MemoryRepository, Snapshot};
use repo_index::search::memory::MemoryIndex;

/// Captures tracing output for tests.
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn container(id: i64, alias: &str, owner: Option<i64>) -> ContainerNode {
    ContainerNode {
        id: Some(id),
        name: format!("{} Collection", capitalize(alias)),
        alias: alias.to_string(),
        description: format!("All about {alias}"),
        affiliation: None,
        owner,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn field(name: &str, advanced_search: bool) -> FieldDefinition {
    FieldDefinition {
        id: None,
        title: name.to_string(),
        name: name.to_string(),
        advanced_search,
    }
}

/// Builder for records with metadata and files.
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    pub fn new(id: i64, owner: i64) -> Self {
        Self {
            record: Record {
                id: Some(id),
                persistent_id: format!("doi:10.5072/FK2/R{id}"),
                owner,
                edit_version: Some(RecordVersion::default()),
                latest_version: RecordVersion::default(),
                files: Vec::new(),
                modification_time: None,
                last_indexed_at: None,
            },
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.record.latest_version.title = title.to_string();
        self.metadata("title", title)
    }

    pub fn metadata(mut self, canonical: &str, value: &str) -> Self {
        if let Some(version) = self.record.edit_version.as_mut() {
            version
                .field_values
                .push(FieldValue::new(field(canonical, true), value));
        }
        self
    }

    pub fn file(mut self, id: i64, name: &str, content_type: &str) -> Self {
        self.record.files.push(DataFile {
            id: Some(id),
            name: name.to_string(),
            content_type: content_type.to_string(),
        });
        self
    }

    pub fn released(mut self) -> Self {
        self.record.latest_version.state = VersionState::Released;
        if let Some(draft) = self.record.edit_version.take() {
            self.record.latest_version.field_values = draft.field_values;
        }
        self
    }

    pub fn build(self) -> Record {
        self.record
    }
}

/// root(1) -> econ(2) -> surveys(3); root(1) -> physics(4).
pub fn sample_snapshot() -> Snapshot {
    Snapshot {
        containers: vec![
            container(1, "root", None),
            container(2, "econ", Some(1)),
            container(3, "surveys", Some(2)),
            container(4, "physics", Some(1)),
        ],
        records: vec![
            RecordBuilder::new(10, 3)
                .title("Household Survey 2019")
                .metadata("authorName", "Smith, Jane")
                .metadata("keywordValue", "income")
                .metadata("keywordValue", "households")
                .metadata("productionDate", "2019")
                .file(100, "data.csv", "text/csv")
                .file(101, "codebook.pdf", "application/pdf")
                .build(),
            RecordBuilder::new(11, 4)
                .title("Muon Lifetimes")
                .file(110, "runs.h5", "application/x-hdf5")
                .build(),
            RecordBuilder::new(12, 2).title("Trade Flows").released().build(),
        ],
    }
}

pub struct Harness {
    pub repo: Arc<MemoryRepository>,
    pub index: Arc<MemoryIndex>,
    pub indexer: Indexer,
}

pub fn harness(snapshot: Snapshot) -> Harness {
    harness_with(snapshot, IndexerOptions::default())
}

pub fn harness_with(snapshot: Snapshot, options: IndexerOptions) -> Harness {
    let repo = Arc::new(MemoryRepository::new(snapshot));
    let index = Arc::new(MemoryIndex::new());
    let indexer = Indexer::new(repo.clone(), index.clone(), options);
    Harness {
        repo,
        index,
        indexer,
    }
}
