//! Operational remediation log.
//!
//! When a post-mutation reindex fails, the repository change stands and the
//! failure is appended here as one JSON line naming the entity, the command
//! that triggered it, the error, and the admin trigger that repairs it.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::model::EntityRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationEntry {
    pub timestamp: DateTime<Utc>,
    pub entity: EntityRef,
    /// Command or trigger that requested the reindex.
    pub context: String,
    pub error: String,
    /// Operator action that re-runs the failed work.
    pub remedy: String,
}

impl RemediationEntry {
    pub fn new(entity: EntityRef, context: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            entity,
            context: context.into(),
            error: error.into(),
            remedy: remedy_for(entity),
        }
    }
}

fn remedy_for(entity: EntityRef) -> String {
    match entity.kind {
        crate::model::EntityKind::Container => {
            format!("repo-index reindex-container --id {}", entity.id)
        }
        _ => format!("repo-index reindex-record --id {}", entity.id),
    }
}

enum Sink {
    File(PathBuf),
    Memory(Vec<RemediationEntry>),
}

pub struct RemediationLog {
    sink: Mutex<Sink>,
}

impl RemediationLog {
    /// Append entries to a JSON-lines file, creating it on first write.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            sink: Mutex::new(Sink::File(path.into())),
        }
    }

    pub fn memory() -> Self {
        Self {
            sink: Mutex::new(Sink::Memory(Vec::new())),
        }
    }

    /// Record a failure. Write errors are logged, never propagated.
    pub fn record(&self, entry: RemediationEntry) {
        error!(
            entity = %entry.entity,
            context = %entry.context,
            error = %entry.error,
            remedy = %entry.remedy,
            "reindex failed; remediation required"
        );
        let mut sink = self.sink.lock();
        match &mut *sink {
            Sink::Memory(entries) => entries.push(entry),
            Sink::File(path) => {
                if let Err(e) = append_line(path, &entry) {
                    warn!(path = %path.display(), error = %e, "failed to write remediation log");
                }
            }
        }
    }

    /// Entries recorded so far.
    pub fn entries(&self) -> Vec<RemediationEntry> {
        match &*self.sink.lock() {
            Sink::Memory(entries) => entries.clone(),
            Sink::File(path) => read_entries(path).unwrap_or_default(),
        }
    }
}

fn append_line(path: &Path, entry: &RemediationEntry) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{line}")?;
    Ok(())
}

fn read_entries(path: &Path) -> anyhow::Result<Vec<RemediationEntry>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_log_keeps_entries() {
        let log = RemediationLog::memory();
        log.record(RemediationEntry::new(
            EntityRef::record(5),
            "SetExternalStatusCommand",
            "search index unavailable: refused",
        ));
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].remedy, "repo-index reindex-record --id 5");
    }

    #[test]
    fn file_log_appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("remediation.jsonl");
        let log = RemediationLog::file(&path);
        log.record(RemediationEntry::new(EntityRef::record(1), "a", "x"));
        log.record(RemediationEntry::new(EntityRef::container(2), "b", "y"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let entries = log.entries();
        assert_eq!(entries[1].entity, EntityRef::container(2));
        assert_eq!(entries[1].remedy, "repo-index reindex-container --id 2");
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let log = RemediationLog::file(dir.path().join("none.jsonl"));
        assert!(log.entries().is_empty());
    }
}
