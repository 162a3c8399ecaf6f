//! Credential fetch + verify gate.
//!
//! Every job (and every credential update) passes through here before an
//! adapter runs: fetch the record stored for the instance's actor under
//! this socket's own store scope, persist the instance when its adapter
//! type is shared, and verify the submitted credentials against the hash
//! the instance adopted.

use tracing::debug;

use crate::crypto;
use crate::registry::{PlatformInstance, SharedRegistry};
use crate::store::CredentialStore;
use crate::types::{CredentialRecord, SocketId};
use crate::worker::WorkerError;

/// Fetch credentials for `instance`'s actor and gate access to it.
///
/// For persist-flagged adapter types: a store failure aborts the job; on
/// success the socket is registered into the instance's interest set and
/// the instance is upserted into the registry (first-writer-wins — if
/// another worker persisted an instance for the same actor first, the
/// incumbent is adopted and `instance` is swapped to it).
///
/// For non-persist types a store failure is non-fatal: the job proceeds
/// with no credentials, nothing is persisted, and no hash is adopted.
///
/// Verification: an already-adopted credentials hash must match the digest
/// of the fetched payload exactly; a fresh instance adopts the digest.
/// Mismatch fails the job and leaves the instance untouched.
pub(crate) async fn fetch_and_verify(
    store: &dyn CredentialStore,
    registry: &SharedRegistry,
    instance: &mut PlatformInstance,
    socket_id: &SocketId,
) -> Result<Option<CredentialRecord>, WorkerError> {
    let persist = instance.module.config().persist;

    let credentials = match store.get(&instance.actor.id).await {
        Ok(record) => Some(record),
        Err(source) => {
            if persist {
                return Err(WorkerError::Credentials {
                    actor: instance.actor.id.clone(),
                    source,
                });
            }
            debug!(
                actor = %instance.actor.id,
                error = %source,
                "no stored credentials, continuing without"
            );
            None
        }
    };

    if persist {
        debug!(instance = %instance.id, "persisting platform instance");
        *instance = registry.persist(instance, socket_id);
    }

    if let Some(record) = &credentials {
        let digest = crypto::digest(&record.object);
        let winning = if persist {
            registry.adopt_credentials_hash(instance.id, &digest)
        } else {
            instance
                .credentials_hash
                .get_or_insert_with(|| digest.clone())
                .clone()
        };

        if winning != digest {
            return Err(WorkerError::CredentialMismatch(instance.actor.id.clone()));
        }
        instance.credentials_hash = Some(winning);
    }

    Ok(credentials)
}
