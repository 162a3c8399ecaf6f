//! Credential-update protocol: the only post-adoption mutation path.

use switchboard::crypto;
use switchboard::worker::outbound::UpdateError;

use crate::util::{send_message, smtp_credentials, Behavior, TestHub};

#[tokio::test]
async fn update_round_trip_rekeys_the_instance() {
    let hub = TestHub::new(true, Behavior::Succeed);
    let (worker, _rx) = hub.worker("socket-a");
    hub.save_credentials("socket-a", "user@example.com", smtp_credentials())
        .await;

    worker
        .process(hub.job("job-1", &send_message("user@example.com")))
        .await
        .expect("adopting job");
    let before = hub
        .registry
        .resolve_actor("user@example.com")
        .expect("instance");

    let new_object = serde_json::json!({"username": "newname", "password": "rotated"});
    let updater = hub.recording.context().credentials;
    updater
        .update("newname", "example.org", new_object.clone())
        .await
        .expect("update succeeds");

    let after = hub
        .registry
        .resolve_actor("email://newname@example.org")
        .expect("re-indexed under the new identity");
    assert_eq!(after.id, before.id, "same instance");
    assert_eq!(after.actor.display_name.as_deref(), Some("newname"));
    assert_eq!(
        after.credentials_hash.as_deref(),
        Some(crypto::digest(&new_object).as_str()),
        "hash recomputed over the new payload"
    );

    // a job addressed to the new identity resolves the same instance
    worker
        .process(hub.job("job-2", &send_message("email://newname@example.org")))
        .await
        .expect("job under the new identity");
    assert_eq!(hub.registry.instance_count(), 1);
    assert_eq!(hub.recording.call_count(), 2);
}

#[tokio::test]
async fn malformed_arguments_fail_fast_without_mutation() {
    let hub = TestHub::new(true, Behavior::Succeed);
    let (worker, _rx) = hub.worker("socket-a");
    hub.save_credentials("socket-a", "user@example.com", smtp_credentials())
        .await;
    worker
        .process(hub.job("job-1", &send_message("user@example.com")))
        .await
        .expect("adopting job");

    let updater = hub.recording.context().credentials;
    let object = serde_json::json!({"password": "x"});

    assert!(matches!(
        updater.update("", "example.org", object.clone()).await,
        Err(UpdateError::MissingName)
    ));
    assert!(matches!(
        updater.update("name", "", object.clone()).await,
        Err(UpdateError::MissingServer)
    ));
    assert!(matches!(
        updater
            .update("name", "example.org", serde_json::json!("not an object"))
            .await,
        Err(UpdateError::MissingObject)
    ));

    let instance = hub
        .registry
        .resolve_actor("user@example.com")
        .expect("instance untouched");
    assert_eq!(instance.actor.id, "user@example.com");
    assert_eq!(
        instance.credentials_hash.as_deref(),
        Some(crypto::digest(&smtp_credentials()).as_str())
    );
}

#[tokio::test]
async fn update_fails_when_the_instance_is_gone() {
    let hub = TestHub::new(true, Behavior::Succeed);
    let (worker, _rx) = hub.worker("socket-a");
    hub.save_credentials("socket-a", "user@example.com", smtp_credentials())
        .await;
    worker
        .process(hub.job("job-1", &send_message("user@example.com")))
        .await
        .expect("adopting job");

    let instance = hub
        .registry
        .resolve_actor("user@example.com")
        .expect("instance");
    hub.registry.remove_instance(instance.id);

    let updater = hub.recording.context().credentials;
    let result = updater
        .update("name", "example.org", serde_json::json!({"p": "x"}))
        .await;
    assert!(matches!(result, Err(UpdateError::InstanceGone)));
}
