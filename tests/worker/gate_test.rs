//! Credential gate: verify-or-adopt, mismatch handling, and the
//! non-persist leniency.

use switchboard::crypto;
use switchboard::worker::WorkerError;

use crate::util::{send_message, smtp_credentials, Behavior, TestHub};

#[tokio::test]
async fn mismatched_credentials_fail_without_mutating_the_instance() {
    let hub = TestHub::new(true, Behavior::Succeed);
    let (worker_a, _rx_a) = hub.worker("socket-a");
    let (worker_b, _rx_b) = hub.worker("socket-b");

    hub.save_credentials("socket-a", "user@example.com", smtp_credentials())
        .await;
    hub.save_credentials(
        "socket-b",
        "user@example.com",
        serde_json::json!({"username": "user", "password": "wrong"}),
    )
    .await;

    worker_a
        .process(hub.job("job-1", &send_message("user@example.com")))
        .await
        .expect("adopting job succeeds");
    let adopted = crypto::digest(&smtp_credentials());

    let error = worker_b
        .process(hub.job("job-2", &send_message("user@example.com")))
        .await
        .expect_err("divergent credentials rejected");
    assert!(
        matches!(error, WorkerError::CredentialMismatch(ref actor) if actor == "user@example.com")
    );
    assert!(error.to_string().contains("user@example.com"));

    let instance = hub
        .registry
        .resolve_actor("user@example.com")
        .expect("instance survives the mismatch");
    assert_eq!(
        instance.credentials_hash.as_deref(),
        Some(adopted.as_str()),
        "adopted hash unchanged"
    );

    // the original submitter still gets through
    worker_a
        .process(hub.job("job-3", &send_message("user@example.com")))
        .await
        .expect("original credentials still accepted");
}

#[tokio::test]
async fn non_persist_store_failure_is_not_fatal() {
    let hub = TestHub::new(false, Behavior::Succeed);
    let (worker, _rx) = hub.worker("socket-a");

    // no credentials stored at all
    let result = worker
        .process(hub.job("job-1", &send_message("user@example.com")))
        .await
        .expect("job proceeds without credentials");
    assert_eq!(result, Some(serde_json::json!({"status": true})));

    let calls = hub.recording.calls.lock().expect("calls lock");
    assert!(calls[0].2.is_none(), "adapter invoked with no credentials");
    drop(calls);

    assert_eq!(hub.registry.instance_count(), 0, "nothing persisted");
}

#[tokio::test]
async fn non_persist_instances_stay_private_even_with_credentials() {
    let hub = TestHub::new(false, Behavior::Succeed);
    let (worker, _rx) = hub.worker("socket-a");
    hub.save_credentials("socket-a", "user@example.com", smtp_credentials())
        .await;

    worker
        .process(hub.job("job-1", &send_message("user@example.com")))
        .await
        .expect("job succeeds");

    let calls = hub.recording.calls.lock().expect("calls lock");
    assert!(calls[0].2.is_some(), "credentials still passed through");
    drop(calls);

    assert_eq!(hub.registry.instance_count(), 0);
    assert!(hub.registry.resolve_actor("user@example.com").is_none());
}
