//! Per-socket encrypted credential store.
//!
//! Each socket connection gets its own store namespace, so credentials one
//! client submits are never visible to another client's lookups even when
//! the stores share a backing. Values are persisted only as sealed
//! envelopes; the storage backend never sees plaintext.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::crypto::{self, CryptoError, SealKey};
use crate::types::{CredentialRecord, SocketId};

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record stored under the requested actor identity.
    #[error("no credentials stored for actor {0}")]
    NotFound(String),
    /// The stored blob could not be opened or decoded.
    #[error("stored credentials are unreadable: {0}")]
    Unreadable(String),
    /// Sealing a record for storage failed.
    #[error(transparent)]
    Seal(#[from] CryptoError),
}

/// Scoped access to credential records, keyed by actor identity.
///
/// Consumed by the worker's credential gate and the credential-update
/// protocol. The storage backend behind `get`/`save` is out of scope; this
/// trait is the whole contract.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch and decrypt the record stored for `actor_id`.
    async fn get(&self, actor_id: &str) -> Result<CredentialRecord, StoreError>;

    /// Encrypt and persist `record` under `actor_id`, overwriting any
    /// previous record.
    async fn save(&self, actor_id: &str, record: &CredentialRecord) -> Result<(), StoreError>;
}

/// Shared backing map for [`EncryptedMemoryStore`] instances.
///
/// Mirrors one storage server shared by every worker in the process; the
/// per-store namespace keeps entries apart.
pub type StoreBacking = Arc<RwLock<HashMap<String, String>>>;

/// In-memory [`CredentialStore`] holding sealed envelopes.
pub struct EncryptedMemoryStore {
    namespace: String,
    key: SealKey,
    backing: StoreBacking,
}

impl EncryptedMemoryStore {
    /// Create a store for one socket connection with a private backing.
    pub fn new(hub_id: &str, socket_id: &SocketId, key: SealKey) -> Self {
        Self::with_backing(hub_id, socket_id, key, StoreBacking::default())
    }

    /// Create a store for one socket connection over a shared backing.
    pub fn with_backing(
        hub_id: &str,
        socket_id: &SocketId,
        key: SealKey,
        backing: StoreBacking,
    ) -> Self {
        Self {
            namespace: format!("switchboard:{hub_id}:worker:{socket_id}:store"),
            key,
            backing,
        }
    }

    fn entry_key(&self, actor_id: &str) -> String {
        format!("{}:{actor_id}", self.namespace)
    }
}

#[async_trait]
impl CredentialStore for EncryptedMemoryStore {
    async fn get(&self, actor_id: &str) -> Result<CredentialRecord, StoreError> {
        let entries = self.backing.read().await;
        let sealed = entries
            .get(&self.entry_key(actor_id))
            .ok_or_else(|| StoreError::NotFound(actor_id.to_owned()))?;

        let plaintext =
            crypto::open(&self.key, sealed).map_err(|e| StoreError::Unreadable(e.to_string()))?;
        serde_json::from_slice(&plaintext).map_err(|e| StoreError::Unreadable(e.to_string()))
    }

    async fn save(&self, actor_id: &str, record: &CredentialRecord) -> Result<(), StoreError> {
        let plaintext =
            serde_json::to_vec(record).map_err(|e| StoreError::Unreadable(e.to_string()))?;
        let sealed = crypto::seal(&self.key, &plaintext)?;

        let mut entries = self.backing.write().await;
        entries.insert(self.entry_key(actor_id), sealed);
        Ok(())
    }
}
