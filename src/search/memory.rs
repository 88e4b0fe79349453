//! In-process index used for dry runs and tests.
//!
//! Mirrors the visibility rules of the real engine: adds and deletes are
//! staged and only become visible after `commit`. Failures can be scripted
//! per operation to exercise the indexer's error paths.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;

use crate::indexer::document::IndexDocument;
use crate::search::client::{IndexClient, IndexClientError, IndexClientResult, MATCH_ALL};

/// Operations recorded by [`MemoryIndex`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOp {
    DeleteByQuery(String),
    Add(Vec<String>),
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    DeleteByQuery,
    Add,
    Commit,
}

#[derive(Default)]
struct State {
    committed: BTreeMap<String, IndexDocument>,
    staged_adds: Vec<IndexDocument>,
    staged_clear: Option<String>,
    ops: Vec<IndexOp>,
    scripted_failures: VecDeque<(OpKind, IndexClientError)>,
    /// Fail every add whose batch contains this document id.
    poisoned_ids: Vec<String>,
}

#[derive(Default)]
pub struct MemoryIndex {
    state: Mutex<State>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next call of `kind` fails with `error`.
    pub fn fail_next(&self, kind: OpKind, error: IndexClientError) {
        self.state.lock().scripted_failures.push_back((kind, error));
    }

    /// Every add containing `document_id` fails with a protocol error.
    pub fn poison(&self, document_id: impl Into<String>) {
        self.state.lock().poisoned_ids.push(document_id.into());
    }

    pub fn committed(&self) -> Vec<IndexDocument> {
        self.state.lock().committed.values().cloned().collect()
    }

    pub fn get(&self, document_id: &str) -> Option<IndexDocument> {
        self.state.lock().committed.get(document_id).cloned()
    }

    pub fn count_type(&self, type_tag: &str) -> usize {
        self.state
            .lock()
            .committed
            .values()
            .filter(|doc| {
                doc.get(crate::indexer::document::fields::TYPE)
                    .and_then(|v| v.as_str())
                    == Some(type_tag)
            })
            .count()
    }

    pub fn ops(&self) -> Vec<IndexOp> {
        self.state.lock().ops.clone()
    }

    /// Seed committed documents directly, bypassing the op log.
    pub fn seed(&self, documents: impl IntoIterator<Item = IndexDocument>) {
        let mut state = self.state.lock();
        for doc in documents {
            state.committed.insert(doc.id().to_string(), doc);
        }
    }

    fn take_failure(state: &mut State, kind: OpKind) -> IndexClientResult<()> {
        if let Some(pos) = state
            .scripted_failures
            .iter()
            .position(|(k, _)| *k == kind)
            && let Some((_, err)) = state.scripted_failures.remove(pos)
        {
            return Err(err);
        }
        Ok(())
    }
}

impl IndexClient for MemoryIndex {
    fn id(&self) -> &str {
        "memory"
    }

    fn delete_by_query(&self, query: &str) -> IndexClientResult<()> {
        let mut state = self.state.lock();
        Self::take_failure(&mut state, OpKind::DeleteByQuery)?;
        if query != MATCH_ALL {
            return Err(IndexClientError::IndexProtocolError(format!(
                "unsupported query {query:?}"
            )));
        }
        state.ops.push(IndexOp::DeleteByQuery(query.to_string()));
        state.staged_clear = Some(query.to_string());
        state.staged_adds.clear();
        Ok(())
    }

    fn add(&self, documents: &[IndexDocument]) -> IndexClientResult<()> {
        let mut state = self.state.lock();
        Self::take_failure(&mut state, OpKind::Add)?;
        if let Some(bad) = documents
            .iter()
            .find(|doc| state.poisoned_ids.iter().any(|id| id == doc.id()))
        {
            return Err(IndexClientError::IndexProtocolError(format!(
                "document {} rejected",
                bad.id()
            )));
        }
        state.ops.push(IndexOp::Add(
            documents.iter().map(|d| d.id().to_string()).collect(),
        ));
        state.staged_adds.extend(documents.iter().cloned());
        Ok(())
    }

    fn commit(&self) -> IndexClientResult<()> {
        let mut state = self.state.lock();
        Self::take_failure(&mut state, OpKind::Commit)?;
        state.ops.push(IndexOp::Commit);
        if state.staged_clear.take().is_some() {
            state.committed.clear();
        }
        let staged = std::mem::take(&mut state.staged_adds);
        for doc in staged {
            state.committed.insert(doc.id().to_string(), doc);
        }
        Ok(())
    }
}
