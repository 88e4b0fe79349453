//! Read and persist access to the container/record hierarchy.
//!
//! The indexer never reaches into a database directly; everything it needs
//! goes through the [`Repository`] trait so tests and the CLI can substitute
//! [`MemoryRepository`], which is backed by a JSON snapshot file.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ContainerNode, Record};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("repository has no root container")]
    MissingRoot,

    #[error("repository has {0} containers without an owner")]
    MultipleRoots(usize),

    #[error("record {0} not found")]
    RecordNotFound(i64),

    #[error("record has no identifier and cannot be persisted")]
    UnsavedRecord,

    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RepositoryError {
    pub fn help_message(&self) -> &'static str {
        match self {
            RepositoryError::MissingRoot | RepositoryError::MultipleRoots(_) => {
                "Exactly one container must have no owner."
            }
            RepositoryError::RecordNotFound(_) => "Check the record id.",
            RepositoryError::Io(_) | RepositoryError::Parse(_) => {
                "Check the snapshot path and that it contains valid JSON."
            }
            RepositoryError::UnsavedRecord => "Persist the record before mutating it.",
        }
    }
}

/// Access to repository state. Repository state is authoritative; the index
/// only ever mirrors it.
pub trait Repository: Send + Sync {
    /// The single container without an owner.
    fn root_container(&self) -> Result<ContainerNode, RepositoryError>;
    fn container(&self, id: i64) -> Result<Option<ContainerNode>, RepositoryError>;
    fn containers(&self) -> Result<Vec<ContainerNode>, RepositoryError>;
    fn record(&self, id: i64) -> Result<Option<Record>, RepositoryError>;
    fn records(&self) -> Result<Vec<Record>, RepositoryError>;
    fn find_record_by_persistent_id(
        &self,
        persistent_id: &str,
    ) -> Result<Option<Record>, RepositoryError>;
    /// Persist a mutated record, replacing the stored copy.
    fn save_record(&self, record: &Record) -> Result<(), RepositoryError>;
    /// Stamp the record's index timestamp after a successful pass.
    fn mark_indexed(&self, record_id: i64, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}

/// Serialized form of a [`MemoryRepository`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub containers: Vec<ContainerNode>,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// In-process repository holding the whole hierarchy.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<Snapshot>,
}

impl MemoryRepository {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Load a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RepositoryError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(Self::new(snapshot))
    }

    /// Write the current state back to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), RepositoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*self.state.read())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.read().clone()
    }

    pub fn insert_container(&self, container: ContainerNode) {
        self.state.write().containers.push(container);
    }

    pub fn insert_record(&self, record: Record) {
        self.state.write().records.push(record);
    }
}

impl Repository for MemoryRepository {
    fn root_container(&self) -> Result<ContainerNode, RepositoryError> {
        let state = self.state.read();
        let mut roots = state.containers.iter().filter(|c| c.is_root());
        let root = roots.next().ok_or(RepositoryError::MissingRoot)?;
        let extra = roots.count();
        if extra > 0 {
            return Err(RepositoryError::MultipleRoots(extra + 1));
        }
        Ok(root.clone())
    }

    fn container(&self, id: i64) -> Result<Option<ContainerNode>, RepositoryError> {
        Ok(self
            .state
            .read()
            .containers
            .iter()
            .find(|c| c.id == Some(id))
            .cloned())
    }

    fn containers(&self) -> Result<Vec<ContainerNode>, RepositoryError> {
        Ok(self.state.read().containers.clone())
    }

    fn record(&self, id: i64) -> Result<Option<Record>, RepositoryError> {
        Ok(self
            .state
            .read()
            .records
            .iter()
            .find(|r| r.id == Some(id))
            .cloned())
    }

    fn records(&self) -> Result<Vec<Record>, RepositoryError> {
        Ok(self.state.read().records.clone())
    }

    fn find_record_by_persistent_id(
        &self,
        persistent_id: &str,
    ) -> Result<Option<Record>, RepositoryError> {
        Ok(self
            .state
            .read()
            .records
            .iter()
            .find(|r| r.persistent_id == persistent_id)
            .cloned())
    }

    fn save_record(&self, record: &Record) -> Result<(), RepositoryError> {
        let id = record.id.ok_or(RepositoryError::UnsavedRecord)?;
        let mut state = self.state.write();
        let slot = state
            .records
            .iter_mut()
            .find(|r| r.id == Some(id))
            .ok_or(RepositoryError::RecordNotFound(id))?;
        *slot = record.clone();
        Ok(())
    }

    fn mark_indexed(&self, record_id: i64, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == Some(record_id))
            .ok_or(RepositoryError::RecordNotFound(record_id))?;
        record.last_indexed_at = Some(at);
        Ok(())
    }
}
