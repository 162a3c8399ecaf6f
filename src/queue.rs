//! Per-socket job channel plumbing.
//!
//! The broker itself is out of scope; it is assumed to be a durable,
//! at-least-once FIFO per topic with an explicit completion callback. This
//! module maps that contract onto channels: the transport enqueues a
//! [`JobRequest`] per dequeued job, and the worker answers the request's
//! completion channel exactly once.

use tokio::sync::{mpsc, oneshot};

use crate::types::Job;
use crate::worker::WorkerError;

/// Completion outcome of one job, delivered back to the broker side.
pub type JobOutcome = Result<Option<serde_json::Value>, WorkerError>;

/// One dequeued job together with its completion channel.
#[derive(Debug)]
pub struct JobRequest {
    /// The job to process.
    pub job: Job,
    /// Completion channel; answered exactly once per job.
    pub done: oneshot::Sender<JobOutcome>,
}

/// Create the channel pair for one socket's job stream.
///
/// `depth` bounds how many dequeued jobs may be in flight toward the
/// worker before the broker side is back-pressured.
pub fn job_channel(depth: usize) -> (mpsc::Sender<JobRequest>, mpsc::Receiver<JobRequest>) {
    mpsc::channel(depth.max(1))
}

/// Submit a job and await its outcome.
///
/// Convenience for the transport side: enqueues the job and waits for the
/// worker's completion. A closed channel (worker gone) surfaces as a
/// failed outcome.
pub async fn submit(tx: &mpsc::Sender<JobRequest>, job: Job) -> JobOutcome {
    let (done, outcome) = oneshot::channel();
    let job_id = job.id.clone();

    if tx.send(JobRequest { job, done }).await.is_err() {
        return Err(WorkerError::WorkerGone(job_id));
    }
    match outcome.await {
        Ok(result) => result,
        Err(_) => Err(WorkerError::WorkerGone(job_id)),
    }
}
