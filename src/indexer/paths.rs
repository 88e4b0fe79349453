//! Materialized ancestor paths for hierarchical filtering.
//!
//! A container at depth `n` below the root yields `n` segments and `n`
//! prefix-closed subtree paths, so a document can be matched by a filter
//! anchored at any of its ancestors:
//!
//! ```text
//! root ─ econ ─ surveys     ->  ["/econ", "/econ/surveys"]
//! ```

use thiserror::Error;

use crate::model::ContainerNode;
use crate::repository::{Repository, RepositoryError};

/// Default ceiling on ancestor walks; deeper chains are reported as cycles.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Why an ancestor chain could not be resolved to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyFault {
    /// The walk exceeded the depth ceiling, which indicates a cycle.
    DepthExceeded(usize),
    /// An owner id that does not resolve to a container.
    DanglingOwner(i64),
    /// Reached an ownerless container that is not the repository root.
    Detached,
    /// The repository has no single root.
    MissingRoot,
}

impl std::fmt::Display for HierarchyFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HierarchyFault::DepthExceeded(ceiling) => {
                write!(f, "ancestor chain deeper than {ceiling} (cycle?)")
            }
            HierarchyFault::DanglingOwner(owner) => write!(f, "owner {owner} does not exist"),
            HierarchyFault::Detached => write!(f, "chain ends at a container other than the root"),
            HierarchyFault::MissingRoot => write!(f, "repository root not found"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("malformed hierarchy at container {container:?}: {fault}")]
    MalformedHierarchy {
        container: Option<i64>,
        fault: HierarchyFault,
    },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl PathError {
    pub fn help_message(&self) -> &'static str {
        match self {
            PathError::MalformedHierarchy { .. } => {
                "Fix the container ownership chain, then re-run the reindex for this entity."
            }
            PathError::Repository(_) => "Check repository connectivity.",
        }
    }
}

/// Walks container ownership chains up to the repository root.
pub struct PathMaterializer<'a> {
    repo: &'a dyn Repository,
    max_depth: usize,
}

impl<'a> PathMaterializer<'a> {
    pub fn new(repo: &'a dyn Repository, max_depth: usize) -> Self {
        Self { repo, max_depth }
    }

    /// Aliases from just below the root down to `node` itself. The root
    /// yields an empty list.
    pub fn segments(&self, node: &ContainerNode) -> Result<Vec<String>, PathError> {
        let root = self.repo.root_container().map_err(|e| match e {
            RepositoryError::MissingRoot | RepositoryError::MultipleRoots(_) => {
                PathError::MalformedHierarchy {
                    container: node.id,
                    fault: HierarchyFault::MissingRoot,
                }
            }
            other => PathError::Repository(other),
        })?;

        let malformed = |fault| PathError::MalformedHierarchy {
            container: node.id,
            fault,
        };

        let mut segments = Vec::new();
        let mut current = node.clone();
        loop {
            if current.is_root() {
                if current.id != root.id {
                    return Err(malformed(HierarchyFault::Detached));
                }
                break;
            }
            if segments.len() >= self.max_depth {
                return Err(malformed(HierarchyFault::DepthExceeded(self.max_depth)));
            }
            segments.push(current.alias.clone());

            // is_root() was false, so owner is set
            let Some(owner) = current.owner else { break };
            current = self
                .repo
                .container(owner)?
                .ok_or_else(|| malformed(HierarchyFault::DanglingOwner(owner)))?;
        }

        segments.reverse();
        Ok(segments)
    }

    /// Prefix-closed subtree path set for `node`.
    pub fn subtree_paths(&self, node: &ContainerNode) -> Result<Vec<String>, PathError> {
        Ok(paths_from_segments(&self.segments(node)?))
    }
}

/// `[a, b, c]` becomes `["/a", "/a/b", "/a/b/c"]`.
pub fn paths_from_segments<S: AsRef<str>>(segments: &[S]) -> Vec<String> {
    let mut paths = Vec::with_capacity(segments.len());
    let mut prefix = String::new();
    for segment in segments {
        prefix.push('/');
        prefix.push_str(segment.as_ref());
        paths.push(prefix.clone());
    }
    paths
}
