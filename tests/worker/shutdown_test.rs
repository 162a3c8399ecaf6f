//! Worker shutdown: detach the socket, never destroy instances.

use crate::util::{send_message, smtp_credentials, Behavior, TestHub};

#[tokio::test]
async fn shutdown_detaches_the_socket_but_keeps_instances() {
    let hub = TestHub::new(true, Behavior::Succeed);
    let (worker_a, _rx_a) = hub.worker("socket-a");
    let (worker_b, mut rx_b) = hub.worker("socket-b");

    hub.save_credentials("socket-a", "user@example.com", smtp_credentials())
        .await;
    hub.save_credentials("socket-b", "user@example.com", smtp_credentials())
        .await;
    worker_a
        .process(hub.job("job-1", &send_message("user@example.com")))
        .await
        .expect("join from a");
    worker_b
        .process(hub.job("job-2", &send_message("user@example.com")))
        .await
        .expect("join from b");

    worker_a.shutdown();
    worker_a.shutdown(); // idempotent

    assert!(!hub.registry.has_socket(&"socket-a".to_owned()));
    assert!(hub.registry.has_socket(&"socket-b".to_owned()));

    let instance = hub
        .registry
        .resolve_actor("user@example.com")
        .expect("instance survives a departing socket");
    assert!(!instance.sockets.contains("socket-a"));
    assert!(instance.sockets.contains("socket-b"));

    // remaining subscribers still receive fan-out
    let sender = hub.recording.context().sender;
    sender.send(switchboard::types::ActivityMessage::connect_error(
        instance.actor.clone(),
        "notice",
    ));
    rx_b.try_recv().expect("socket-b still receives messages");
}
