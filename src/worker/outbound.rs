//! Handles an adapter uses to communicate outward.
//!
//! Both are bound to one platform-instance id at construction time and
//! handed to the adapter when it is built: [`OutboundSender`] fans
//! messages out to every interested socket, [`CredentialUpdater`] is the
//! only path by which an instance's credentials may change after initial
//! adoption.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto;
use crate::registry::SharedRegistry;
use crate::store::{CredentialStore, StoreError};
use crate::types::{ActivityMessage, SocketId};
use crate::worker::{gate, WorkerError};

/// Outbound message fan-out, bound to one platform instance.
///
/// The only channel by which an adapter communicates to clients. It never
/// fails back into adapter code: every failure mode is a logged diagnostic
/// and, where a dead socket is discovered, a registry pruning.
#[derive(Clone)]
pub struct OutboundSender {
    registry: SharedRegistry,
    instance_id: Uuid,
    own_socket: SocketId,
}

impl OutboundSender {
    pub(crate) fn new(registry: SharedRegistry, instance_id: Uuid, own_socket: SocketId) -> Self {
        Self {
            registry,
            instance_id,
            own_socket,
        }
    }

    /// Deliver a message to every socket interested in this instance.
    ///
    /// The message's `context` is stamped with the instance's platform
    /// name. Sockets whose handle is missing from the liveness table, or
    /// whose delivery fails, are pruned from both the table and the
    /// instance's interest set; when the pruned socket is this sender's
    /// own, the owning worker is shut down (detached everywhere).
    pub fn send(&self, message: ActivityMessage) {
        let Some(instance) = self.registry.instance(self.instance_id) else {
            debug!(
                instance = %self.instance_id,
                "unable to propagate message, platform instance cannot be found"
            );
            return;
        };

        for socket_id in &instance.sockets {
            let delivered = match self.registry.socket(socket_id) {
                Some(handle) => {
                    let mut outgoing = message.clone();
                    outgoing.context = instance.name.clone();
                    debug!(socket = %socket_id, "sending message to socket");
                    handle.deliver(outgoing).is_ok()
                }
                None => false,
            };

            if !delivered {
                debug!(socket = %socket_id, "deleting stale socket reference");
                self.registry.prune_socket(self.instance_id, socket_id);
                if *socket_id == self.own_socket {
                    self.registry.detach_socket(&self.own_socket);
                }
            }
        }
    }
}

/// Failures of the credential-update protocol.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// No new name was provided.
    #[error("update credentials called with no new name specified")]
    MissingName,
    /// No new server was provided.
    #[error("update credentials called with no new server specified")]
    MissingServer,
    /// The new credential payload is not an object.
    #[error("update credentials called with no new credentials object provided")]
    MissingObject,
    /// The platform instance no longer exists.
    #[error("unable to update credentials, platform instance cannot be found")]
    InstanceGone,
    /// Fetching or verifying the existing credentials failed.
    #[error(transparent)]
    Verify(#[from] WorkerError),
    /// Persisting the rewritten record failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Credential-update protocol handle, bound to one platform instance.
///
/// Adapters call this when the platform renames the account they act as
/// (e.g. a nick change): it rewrites the stored record and the instance's
/// identity in one authorized pass.
#[derive(Clone)]
pub struct CredentialUpdater {
    registry: SharedRegistry,
    store: Arc<dyn CredentialStore>,
    instance_id: Uuid,
    own_socket: SocketId,
}

impl CredentialUpdater {
    pub(crate) fn new(
        registry: SharedRegistry,
        store: Arc<dyn CredentialStore>,
        instance_id: Uuid,
        own_socket: SocketId,
    ) -> Self {
        Self {
            registry,
            store,
            instance_id,
            own_socket,
        }
    }

    /// Rewrite this instance's actor identity and credentials.
    ///
    /// Verifies access by fetching the existing record through the same
    /// gate as job processing, then computes the new actor identity as
    /// `<platform>://<new_name>@<new_server>`, rewrites the record,
    /// updates the instance's actor and credentials hash, re-indexes the
    /// registry, and persists the record under the new identity.
    ///
    /// # Errors
    ///
    /// Fails fast on malformed arguments (nothing mutated), when the
    /// instance is gone, or when the existing credentials cannot be
    /// fetched and verified.
    pub async fn update(
        &self,
        new_name: &str,
        new_server: &str,
        new_object: serde_json::Value,
    ) -> Result<(), UpdateError> {
        if new_name.trim().is_empty() {
            return Err(UpdateError::MissingName);
        }
        if new_server.trim().is_empty() {
            return Err(UpdateError::MissingServer);
        }
        if !new_object.is_object() {
            return Err(UpdateError::MissingObject);
        }

        let mut instance = self
            .registry
            .instance(self.instance_id)
            .ok_or(UpdateError::InstanceGone)?;

        // we must already hold working credentials for this instance
        // before being allowed to replace them
        let existing = gate::fetch_and_verify(
            self.store.as_ref(),
            &self.registry,
            &mut instance,
            &self.own_socket,
        )
        .await?;
        // registry-held instances are persist-flagged, so the gate either
        // returned a record or already failed
        let mut record = existing.ok_or(UpdateError::InstanceGone)?;

        let new_actor_id = format!("{}://{new_name}@{new_server}", instance.name);
        record.actor.id = new_actor_id.clone();
        record.actor.display_name = Some(new_name.to_owned());
        record.object = new_object;

        let digest = crypto::digest(&record.object);
        if !self
            .registry
            .rewrite_actor(self.instance_id, record.actor.clone(), digest)
        {
            return Err(UpdateError::InstanceGone);
        }

        info!(actor = %new_actor_id, "encrypting credentials for rewritten actor");
        self.store.save(&new_actor_id, &record).await?;
        Ok(())
    }
}
