//! Background work that runs off the request path.

pub mod worker;

pub use worker::{
    JobReport, JobResult, JobTicket, ReindexJob, ReindexWorker, ReindexWorkerHandle,
    RetryPolicy, WorkerConfig, WorkerError,
};
