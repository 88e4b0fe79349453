//! Administrative reindex triggers.
//!
//! Every trigger validates its input, queues the job and returns at once;
//! the work itself happens on the reindex workers.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::daemon::worker::{JobTicket, ReindexJob, ReindexWorkerHandle, WorkerError};
use crate::repository::{Repository, RepositoryError};

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("could not dispatch reindex: {0}")]
    Dispatch(#[from] WorkerError),
}

impl AdminError {
    pub fn help_message(&self) -> &'static str {
        match self {
            AdminError::BadRequest(_) => {
                "Provide a persistent identifier such as doi:10.5072/FK2/ABC."
            }
            AdminError::NotFound(_) => "Check the identifier; the entity does not exist.",
            AdminError::Repository(e) => e.help_message(),
            AdminError::Dispatch(_) => "The reindex workers are not running; restart the service.",
        }
    }
}

/// Acknowledgement that a job was queued.
pub struct Accepted {
    pub message: String,
    pub ticket: JobTicket,
}

impl std::fmt::Debug for Accepted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accepted")
            .field("message", &self.message)
            .field("job", self.ticket.job())
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AcceptedBody<'a> {
    status: &'static str,
    message: &'a str,
}

impl Accepted {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(AcceptedBody {
            status: "OK",
            message: &self.message,
        })
        .unwrap_or_default()
    }
}

pub struct AdminApi {
    repo: Arc<dyn Repository>,
    worker: ReindexWorkerHandle,
}

impl AdminApi {
    pub fn new(repo: Arc<dyn Repository>, worker: ReindexWorkerHandle) -> Self {
        Self { repo, worker }
    }

    pub fn trigger_full_reindex(&self) -> Result<Accepted, AdminError> {
        let ticket = self.worker.submit(ReindexJob::Full)?;
        info!("full reindex requested");
        Ok(Accepted {
            message: "full reindex started".into(),
            ticket,
        })
    }

    pub fn trigger_record_reindex(&self, persistent_id: &str) -> Result<Accepted, AdminError> {
        let persistent_id = persistent_id.trim();
        if persistent_id.is_empty() {
            return Err(AdminError::BadRequest("persistentId is required".into()));
        }
        let record = self
            .repo
            .find_record_by_persistent_id(persistent_id)?
            .ok_or_else(|| AdminError::NotFound(format!("record {persistent_id}")))?;
        let Some(id) = record.id else {
            return Err(AdminError::NotFound(format!("record {persistent_id}")));
        };
        self.trigger_record_by_id(id, persistent_id)
    }

    pub fn trigger_record_reindex_by_id(&self, id: i64) -> Result<Accepted, AdminError> {
        let record = self
            .repo
            .record(id)?
            .ok_or_else(|| AdminError::NotFound(format!("record {id}")))?;
        self.trigger_record_by_id(id, &record.persistent_id)
    }

    fn trigger_record_by_id(&self, id: i64, label: &str) -> Result<Accepted, AdminError> {
        let ticket = self.worker.submit(ReindexJob::record(id, "admin reindex"))?;
        info!(record_id = id, "record reindex requested");
        Ok(Accepted {
            message: format!("reindex started for {label}"),
            ticket,
        })
    }

    pub fn trigger_container_reindex(&self, id: i64) -> Result<Accepted, AdminError> {
        let container = self
            .repo
            .container(id)?
            .ok_or_else(|| AdminError::NotFound(format!("container {id}")))?;
        let ticket = self
            .worker
            .submit(ReindexJob::container(id, "admin reindex"))?;
        info!(container_id = id, alias = %container.alias, "container reindex requested");
        Ok(Accepted {
            message: format!("reindex started for {}", container.alias),
            ticket,
        })
    }
}
