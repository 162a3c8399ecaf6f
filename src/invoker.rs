//! Crash-isolated adapter invocation.
//!
//! One adapter verb call runs with bounded blast radius: the call is
//! spawned as its own task (the fault domain — a panic surfaces as a
//! failed join instead of unwinding the host) and raced against a hard
//! deadline. Exactly one of {normal completion, controlled failure,
//! timeout, fault} decides the job, structurally: there is a single
//! return.
//!
//! Timeouts and faults destroy the instance; controlled adapter errors do
//! not.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::registry::{PlatformInstance, SharedRegistry};
use crate::types::{ActivityMessage, CredentialRecord};
use crate::worker::outbound::OutboundSender;
use crate::worker::WorkerError;

/// Hook invoked with a short failure-kind string whenever an adapter is
/// torn down after a fault or timeout.
pub type FailureHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Invoke one adapter verb handler under crash isolation.
///
/// Outcomes, mutually exclusive:
/// - the adapter returns before the deadline → that result (or controlled
///   error) is the job outcome, the instance survives;
/// - the adapter panics → failure path with the panic's description;
/// - the deadline passes → failure path with
///   `"timeout reached for <verb> job"`, the in-flight call is aborted.
///
/// The failure path notifies every interested socket with a
/// `connect`-type error, runs the adapter's `cleanup` (itself isolated),
/// removes the instance from the registry, and invokes `on_failure` with
/// `"platform shutdown"`.
///
/// # Errors
///
/// Controlled adapter failures surface as [`WorkerError::Platform`];
/// faults and timeouts as [`WorkerError::PlatformFailure`].
pub async fn invoke(
    registry: &SharedRegistry,
    sender: &OutboundSender,
    instance: &PlatformInstance,
    message: &ActivityMessage,
    credentials: Option<CredentialRecord>,
    deadline: Duration,
    on_failure: FailureHook,
) -> Result<Option<serde_json::Value>, WorkerError> {
    let module = Arc::clone(&instance.module);
    let verb = message.verb.clone();
    let call = message.clone();
    let task =
        tokio::spawn(async move { module.handle(&verb, &call, credentials.as_ref()).await });
    let abort = task.abort_handle();

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(error))) => {
            debug!(instance = %instance.id, error = %error, "platform returned an error");
            Err(WorkerError::Platform(error))
        }
        Ok(Err(join_error)) => {
            let description = fault_description(join_error);
            warn!(instance = %instance.id, "caught platform fault: {description}");
            teardown(registry, sender, instance, &on_failure, &description).await;
            Err(WorkerError::PlatformFailure(description))
        }
        Err(_elapsed) => {
            abort.abort();
            let description = format!("timeout reached for {} job", message.verb);
            warn!(instance = %instance.id, "{description}");
            teardown(registry, sender, instance, &on_failure, &description).await;
            Err(WorkerError::PlatformFailure(description))
        }
    }
}

/// Failure path shared by timeout and fault: notify clients, clean the
/// adapter up, evict the instance, fire the failure hook.
async fn teardown(
    registry: &SharedRegistry,
    sender: &OutboundSender,
    instance: &PlatformInstance,
    on_failure: &FailureHook,
    description: &str,
) {
    debug!(
        instance = %instance.id,
        "sending connection failure message to clients: {description}"
    );
    sender.send(ActivityMessage::connect_error(
        instance.actor.clone(),
        description,
    ));

    // cleanup runs in its own fault domain; a crashing cleanup must not
    // stop the eviction
    let module = Arc::clone(&instance.module);
    match tokio::spawn(async move { module.cleanup().await }).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            warn!(instance = %instance.id, error = %error, "platform cleanup failed");
        }
        Err(join_error) => {
            warn!(instance = %instance.id, error = %join_error, "platform cleanup crashed");
        }
    }

    registry.remove_instance(instance.id);
    on_failure("platform shutdown");
}

/// Human-readable description of a fault surfaced from the task join.
fn fault_description(join_error: JoinError) -> String {
    if join_error.is_panic() {
        let payload = join_error.into_panic();
        if let Some(text) = payload.downcast_ref::<String>() {
            format!("platform fault: {text}")
        } else if let Some(text) = payload.downcast_ref::<&str>() {
            format!("platform fault: {text}")
        } else {
            "platform fault: unknown panic payload".to_owned()
        }
    } else {
        "platform task cancelled".to_owned()
    }
}
