//! Background reindex workers.
//!
//! Jobs are queued on a channel and processed by a small pool of dedicated
//! threads, so the caller that triggered a reindex never waits on index I/O.
//! Every submission returns a [`JobTicket`]; callers may ignore it
//! (fire-and-forget) or wait on it for the [`JobReport`].

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::indexer::{FullReindexSummary, Indexer, ReindexOutcome};
use crate::model::{EntityKind, EntityRef};
use crate::remediation::{RemediationEntry, RemediationLog};

/// Work the pool knows how to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum ReindexJob {
    Full,
    Record { id: i64, context: String },
    Container { id: i64, context: String },
}

impl ReindexJob {
    pub fn record(id: i64, context: impl Into<String>) -> Self {
        ReindexJob::Record {
            id,
            context: context.into(),
        }
    }

    pub fn container(id: i64, context: impl Into<String>) -> Self {
        ReindexJob::Container {
            id,
            context: context.into(),
        }
    }
}

impl std::fmt::Display for ReindexJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReindexJob::Full => write!(f, "full reindex"),
            ReindexJob::Record { id, .. } => write!(f, "record {id}"),
            ReindexJob::Container { id, .. } => write!(f, "container {id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Full(FullReindexSummary),
    Entity(ReindexOutcome),
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: ReindexJob,
    pub attempts: u32,
    pub result: Result<JobResult, String>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("reindex worker is shut down")]
    Closed,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Re-invocation policy for targeted jobs that fail on connectivity.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.checked_mul(exp).unwrap_or(self.backoff)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub threads: usize,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 2,
            retry: RetryPolicy::default(),
        }
    }
}

enum WorkerMessage {
    Submit {
        job: ReindexJob,
        reply: Sender<JobReport>,
    },
    Shutdown,
}

/// Receipt for a submitted job.
#[derive(Debug)]
pub struct JobTicket {
    job: ReindexJob,
    receiver: Receiver<JobReport>,
}

impl JobTicket {
    pub fn job(&self) -> &ReindexJob {
        &self.job
    }

    /// Block until the job finishes. `None` if the worker died first.
    pub fn wait(self) -> Option<JobReport> {
        self.receiver.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobReport> {
        match self.receiver.recv_timeout(timeout) {
            Ok(report) => Some(report),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Handle for submitting jobs to the pool. Clones share the same pool.
#[derive(Clone)]
pub struct ReindexWorkerHandle {
    sender: Sender<WorkerMessage>,
    threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ReindexWorkerHandle {
    /// Queue a job and return immediately.
    pub fn submit(&self, job: ReindexJob) -> Result<JobTicket, WorkerError> {
        let (reply, receiver) = crossbeam_channel::bounded(1);
        self.sender
            .send(WorkerMessage::Submit {
                job: job.clone(),
                reply,
            })
            .map_err(|_| WorkerError::Closed)?;
        debug!(%job, "reindex job queued");
        Ok(JobTicket { job, receiver })
    }

    /// Stop accepting work, let queued jobs drain, and join the threads.
    pub fn shutdown(&self) {
        let threads = std::mem::take(&mut *self.threads.lock());
        for _ in &threads {
            let _ = self.sender.send(WorkerMessage::Shutdown);
        }
        for thread in threads {
            if thread.join().is_err() {
                error!("reindex worker thread panicked");
            }
        }
    }
}

/// One worker thread's state.
pub struct ReindexWorker {
    indexer: Indexer,
    remediation: Arc<RemediationLog>,
    retry: RetryPolicy,
    receiver: Receiver<WorkerMessage>,
}

impl ReindexWorker {
    /// Spawn the pool and return its handle.
    pub fn start(
        indexer: Indexer,
        remediation: Arc<RemediationLog>,
        config: WorkerConfig,
    ) -> Result<ReindexWorkerHandle, WorkerError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut threads = Vec::with_capacity(config.threads);
        for n in 0..config.threads.max(1) {
            let worker = ReindexWorker {
                indexer: indexer.clone(),
                remediation: remediation.clone(),
                retry: config.retry.clone(),
                receiver: receiver.clone(),
            };
            let thread = std::thread::Builder::new()
                .name(format!("reindex-worker-{n}"))
                .spawn(move || worker.run())?;
            threads.push(thread);
        }
        info!(threads = threads.len(), "reindex workers started");
        Ok(ReindexWorkerHandle {
            sender,
            threads: Arc::new(Mutex::new(threads)),
        })
    }

    fn run(self) {
        while let Ok(msg) = self.receiver.recv() {
            match msg {
                WorkerMessage::Submit { job, reply } => {
                    let report = self.process(job);
                    // the submitter may have dropped its ticket
                    let _ = reply.send(report);
                }
                WorkerMessage::Shutdown => break,
            }
        }
        debug!("reindex worker stopped");
    }

    fn process(&self, job: ReindexJob) -> JobReport {
        info!(%job, "processing reindex job");
        let target = match &job {
            ReindexJob::Full => None,
            ReindexJob::Record { id, context } => Some((EntityRef::record(*id), context.clone())),
            ReindexJob::Container { id, context } => {
                Some((EntityRef::container(*id), context.clone()))
            }
        };
        match target {
            Some((entity, context)) => self.process_targeted(job, entity, &context),
            None => self.process_full(job),
        }
    }

    fn process_full(&self, job: ReindexJob) -> JobReport {
        let result = match self.indexer.index_all() {
            Ok(summary) => {
                for failure in &summary.failures {
                    if let Some(entity) = failure.entity {
                        self.remediation.record(RemediationEntry::new(
                            entity,
                            "full reindex",
                            failure.error.clone(),
                        ));
                    }
                }
                info!(%summary, "full reindex finished");
                Ok(JobResult::Full(summary))
            }
            Err(e) => {
                error!(error = %e, hint = e.help_message(), "full reindex failed");
                Err(e.to_string())
            }
        };
        JobReport {
            job,
            attempts: 1,
            result,
        }
    }

    fn process_targeted(&self, job: ReindexJob, entity: EntityRef, context: &str) -> JobReport {
        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            let outcome = match entity.kind {
                EntityKind::Container => self.indexer.index_container(entity.id),
                _ => self.indexer.index_record(entity.id),
            };
            match outcome {
                Ok(outcome) => break Ok(outcome),
                Err(failure)
                    if failure.error.is_connectivity() && attempts <= self.retry.retries =>
                {
                    let delay = self.retry.delay_for_attempt(attempts);
                    warn!(%entity, attempts, ?delay, error = %failure, "retrying reindex");
                    std::thread::sleep(delay);
                }
                Err(failure) => break Err(failure),
            }
        };

        let result = match result {
            Ok(outcome) => Ok(JobResult::Entity(outcome)),
            Err(failure) => {
                self.remediation.record(RemediationEntry::new(
                    entity,
                    context,
                    failure.to_string(),
                ));
                Err(failure.to_string())
            }
        };
        JobReport {
            job,
            attempts,
            result,
        }
    }
}
