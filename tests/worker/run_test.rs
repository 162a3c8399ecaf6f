//! The run loop: jobs complete exactly once, in arrival order.

use std::sync::Arc;

use switchboard::queue::{self, job_channel};
use switchboard::worker::WorkerError;

use crate::util::{send_message, smtp_credentials, Behavior, TestHub};

#[tokio::test]
async fn run_loop_answers_jobs_in_order() {
    let hub = TestHub::new(true, Behavior::Succeed);
    let (worker, _rx) = hub.worker("socket-a");
    let worker = Arc::new(worker);

    let (tx, jobs) = job_channel(8);
    let runner = Arc::clone(&worker);
    let handle = tokio::spawn(async move { runner.run(jobs).await });

    // first job fails: no credentials yet
    let failed = queue::submit(&tx, hub.job("job-1", &send_message("user@example.com"))).await;
    let error = failed.expect_err("no credentials stored");
    assert!(error.to_string().contains("could not get credentials"));

    hub.save_credentials("socket-a", "user@example.com", smtp_credentials())
        .await;

    let succeeded = queue::submit(&tx, hub.job("job-2", &send_message("user@example.com"))).await;
    assert_eq!(
        succeeded.expect("job succeeds after credentials are set"),
        Some(serde_json::json!({"status": true}))
    );

    // closing the stream ends the loop
    drop(tx);
    handle.await.expect("run loop exits cleanly");
}

#[tokio::test]
async fn submit_to_a_gone_worker_reports_worker_gone() {
    let hub = TestHub::new(true, Behavior::Succeed);
    let (tx, jobs) = job_channel(1);
    drop(jobs);

    let outcome = queue::submit(&tx, hub.job("job-1", &send_message("user@example.com"))).await;
    assert!(matches!(outcome, Err(WorkerError::WorkerGone(ref id)) if id == "job-1"));
}
