//! Reindex orchestration.
//!
//! [`Indexer`] drives both the full-corpus rebuild and targeted reindexing of
//! a single container or record:
//!
//! - **Full**: clear the index and commit, then index every container and
//!   every record (with its files), committing after each entity so partial
//!   progress survives a crash. A bad entity is recorded and skipped; an
//!   unreachable index aborts the pass.
//! - **Targeted**: build -> submit -> commit for one entity. No retries here;
//!   callers decide whether to re-invoke.
//!
//! Re-adding a document with the same key overwrites it, so overlapping
//! full and targeted runs converge on the repository state of the last
//! write per entity.

pub mod document;
pub mod paths;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{ContainerNode, EntityKind, EntityRef, Record};
use crate::repository::{Repository, RepositoryError};
use crate::search::client::{IndexClient, IndexClientError, MATCH_ALL};
use document::{DocumentBuilder, DocumentError, IndexDocument};
use paths::{HierarchyFault, PathError, PathMaterializer};

#[derive(Error, Debug)]
pub enum ReindexError {
    #[error("{0} not found")]
    NotFound(EntityRef),

    #[error(transparent)]
    Hierarchy(#[from] PathError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Index(#[from] IndexClientError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("full reindex interrupted after {summary}: {source}")]
    Interrupted {
        summary: FullReindexSummary,
        source: IndexClientError,
    },
}

impl ReindexError {
    /// Connectivity failures abort the whole operation rather than one entity.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ReindexError::Index(IndexClientError::IndexUnavailable(_))
                | ReindexError::Interrupted { .. }
        )
    }

    pub fn help_message(&self) -> &'static str {
        match self {
            ReindexError::NotFound(_) => "Check the entity id.",
            ReindexError::Hierarchy(e) => e.help_message(),
            ReindexError::Document(e) => e.help_message(),
            ReindexError::Index(e) => e.help_message(),
            ReindexError::Repository(e) => e.help_message(),
            ReindexError::Interrupted { .. } => {
                "Restore index connectivity and run the full reindex again."
            }
        }
    }
}

/// Progress of one targeted reindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexStage {
    Building,
    Submitting,
    Committing,
    Done,
}

impl std::fmt::Display for ReindexStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReindexStage::Building => write!(f, "building"),
            ReindexStage::Submitting => write!(f, "submitting"),
            ReindexStage::Committing => write!(f, "committing"),
            ReindexStage::Done => write!(f, "done"),
        }
    }
}

/// A targeted reindex that ended in the failed state.
#[derive(Error, Debug)]
#[error("reindex of {entity} failed while {during}: {error}")]
pub struct ReindexFailure {
    pub entity: EntityRef,
    pub during: ReindexStage,
    #[source]
    pub error: ReindexError,
}

/// A targeted reindex that reached [`ReindexStage::Done`].
#[derive(Debug, Clone, Serialize)]
pub struct ReindexOutcome {
    pub entity: EntityRef,
    /// Ids of the documents written.
    pub documents: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityFailure {
    pub entity: Option<EntityRef>,
    pub kind: EntityKind,
    pub during: ReindexStage,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FullReindexSummary {
    pub containers: usize,
    pub records: usize,
    pub files: usize,
    /// Entities skipped because they have no identifier.
    pub skipped: usize,
    pub failures: Vec<EntityFailure>,
}

impl std::fmt::Display for FullReindexSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} containers and {} records indexed",
            self.containers, self.records
        )
    }
}

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub max_hierarchy_depth: usize,
    /// Include the root container in full reindex passes.
    pub index_root_container: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: paths::DEFAULT_MAX_DEPTH,
            index_root_container: false,
        }
    }
}

/// Reindex orchestrator. Cheap to clone; shared by worker threads.
#[derive(Clone)]
pub struct Indexer {
    repo: Arc<dyn Repository>,
    client: Arc<dyn IndexClient>,
    options: IndexerOptions,
}

impl Indexer {
    pub fn new(
        repo: Arc<dyn Repository>,
        client: Arc<dyn IndexClient>,
        options: IndexerOptions,
    ) -> Self {
        Self {
            repo,
            client,
            options,
        }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    fn materializer(&self) -> PathMaterializer<'_> {
        PathMaterializer::new(self.repo.as_ref(), self.options.max_hierarchy_depth)
    }

    /// Clear the index and rebuild it from the repository.
    pub fn index_all(&self) -> Result<FullReindexSummary, ReindexError> {
        info!(index = self.client.id(), "deleting all documents before a complete re-index");
        self.client.delete_by_query(MATCH_ALL)?;
        self.client.commit()?;

        let mut summary = FullReindexSummary::default();

        let containers = self.repo.containers()?;
        let total = containers.len();
        for (n, container) in containers.iter().enumerate() {
            if container.is_root() && !self.options.index_root_container {
                continue;
            }
            let Some(id) = container.id else {
                warn!(alias = %container.alias, "skipping container with no id");
                summary.skipped += 1;
                continue;
            };
            match self.index_container_node(container) {
                Ok(outcome) => {
                    summary.containers += 1;
                    debug!(
                        container_id = id,
                        n,
                        total,
                        docs = outcome.documents.len(),
                        "indexed container"
                    );
                }
                Err(failure) => {
                    Self::absorb(&mut summary, failure)?;
                }
            }
        }

        let records = self.repo.records()?;
        let total = records.len();
        for (n, record) in records.iter().enumerate() {
            let Some(id) = record.id else {
                warn!(persistent_id = %record.persistent_id, "skipping record with no id");
                summary.skipped += 1;
                continue;
            };
            match self.index_record_entity(record) {
                Ok(outcome) => {
                    summary.records += 1;
                    summary.files += outcome.documents.len().saturating_sub(1);
                    debug!(record_id = id, n, total, "indexed record");
                }
                Err(failure) => {
                    Self::absorb(&mut summary, failure)?;
                }
            }
        }

        info!(
            containers = summary.containers,
            records = summary.records,
            files = summary.files,
            failures = summary.failures.len(),
            "full reindex complete"
        );
        Ok(summary)
    }

    /// Record a per-entity failure, or abort when the index itself is gone.
    fn absorb(
        summary: &mut FullReindexSummary,
        failure: ReindexFailure,
    ) -> Result<(), ReindexError> {
        warn!(
            entity = %failure.entity,
            during = %failure.during,
            error = %failure.error,
            "entity reindex failed"
        );
        if let ReindexError::Index(source @ IndexClientError::IndexUnavailable(_)) = failure.error {
            return Err(ReindexError::Interrupted {
                summary: std::mem::take(summary),
                source,
            });
        }
        summary.failures.push(EntityFailure {
            entity: Some(failure.entity),
            kind: failure.entity.kind,
            during: failure.during,
            error: failure.error.to_string(),
        });
        Ok(())
    }

    /// Reindex one container by id.
    pub fn index_container(&self, id: i64) -> Result<ReindexOutcome, ReindexFailure> {
        let entity = EntityRef::container(id);
        let container = self
            .repo
            .container(id)
            .map_err(|e| building(entity, e.into()))?
            .ok_or_else(|| building(entity, ReindexError::NotFound(entity)))?;
        self.index_container_node(&container)
    }

    /// Reindex one record (and its files) by id. Stamps `last_indexed_at`
    /// once the commit succeeds.
    pub fn index_record(&self, id: i64) -> Result<ReindexOutcome, ReindexFailure> {
        let entity = EntityRef::record(id);
        let record = self
            .repo
            .record(id)
            .map_err(|e| building(entity, e.into()))?
            .ok_or_else(|| building(entity, ReindexError::NotFound(entity)))?;
        self.index_record_entity(&record)
    }

    /// Documents a record reindex would write, without touching the index.
    pub fn preview_record(&self, id: i64) -> Result<Vec<IndexDocument>, ReindexError> {
        let record = self
            .repo
            .record(id)?
            .ok_or(ReindexError::NotFound(EntityRef::record(id)))?;
        self.record_documents(&record)
    }

    /// Documents a container reindex would write, without touching the index.
    pub fn preview_container(&self, id: i64) -> Result<IndexDocument, ReindexError> {
        let container = self
            .repo
            .container(id)?
            .ok_or(ReindexError::NotFound(EntityRef::container(id)))?;
        self.container_document(&container)
    }

    pub fn index_container_node(
        &self,
        container: &ContainerNode,
    ) -> Result<ReindexOutcome, ReindexFailure> {
        let id = container.id.ok_or_else(|| {
            building(
                EntityRef::container(0),
                DocumentError::MissingIdentifier(EntityKind::Container).into(),
            )
        })?;
        let entity = EntityRef::container(id);
        let doc = self
            .container_document(container)
            .map_err(|e| building(entity, e))?;
        self.submit(entity, vec![doc])
    }

    pub fn index_record_entity(&self, record: &Record) -> Result<ReindexOutcome, ReindexFailure> {
        let id = record.id.ok_or_else(|| {
            building(
                EntityRef::record(0),
                DocumentError::MissingIdentifier(EntityKind::Record).into(),
            )
        })?;
        let entity = EntityRef::record(id);
        debug!(record_id = id, "indexing record");
        let docs = self
            .record_documents(record)
            .map_err(|e| building(entity, e))?;
        let outcome = self.submit(entity, docs)?;
        if let Err(e) = self.repo.mark_indexed(id, Utc::now()) {
            warn!(%entity, error = %e, "failed to stamp index time");
        }
        Ok(outcome)
    }

    fn container_document(&self, container: &ContainerNode) -> Result<IndexDocument, ReindexError> {
        let parent = match container.owner {
            None => None,
            Some(owner) => Some(self.owner_container(container.id, owner)?),
        };
        let subtree = self.materializer().subtree_paths(container)?;
        Ok(DocumentBuilder::container(container, parent.as_ref(), &subtree)?)
    }

    fn record_documents(&self, record: &Record) -> Result<Vec<IndexDocument>, ReindexError> {
        let owner = self.owner_container(None, record.owner)?;
        let subtree = self.materializer().subtree_paths(&owner)?;
        Ok(DocumentBuilder::record(record, &owner, &subtree)?)
    }

    fn owner_container(
        &self,
        child: Option<i64>,
        owner: i64,
    ) -> Result<ContainerNode, ReindexError> {
        self.repo.container(owner)?.ok_or_else(|| {
            PathError::MalformedHierarchy {
                container: child,
                fault: HierarchyFault::DanglingOwner(owner),
            }
            .into()
        })
    }

    /// Submitting -> Committing -> Done. `add` completes before `commit` is issued.
    fn submit(
        &self,
        entity: EntityRef,
        docs: Vec<IndexDocument>,
    ) -> Result<ReindexOutcome, ReindexFailure> {
        let fail = |during, error: IndexClientError| ReindexFailure {
            entity,
            during,
            error: error.into(),
        };

        debug!(%entity, docs = docs.len(), stage = %ReindexStage::Submitting, "adding documents");
        self.client
            .add(&docs)
            .map_err(|e| fail(ReindexStage::Submitting, e))?;

        debug!(%entity, stage = %ReindexStage::Committing, "committing");
        self.client
            .commit()
            .map_err(|e| fail(ReindexStage::Committing, e))?;

        Ok(ReindexOutcome {
            entity,
            documents: docs.iter().map(|d| d.id().to_string()).collect(),
        })
    }
}

fn building(entity: EntityRef, error: ReindexError) -> ReindexFailure {
    ReindexFailure {
        entity,
        during: ReindexStage::Building,
        error,
    }
}
