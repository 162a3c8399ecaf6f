//! Process-wide shared registry.
//!
//! Three mappings shared by every worker and the invoker: actor identity →
//! platform-instance id, instance id → instance record, and socket id →
//! live socket handle. A socket id recorded in an instance's interest set
//! without a live entry in the socket table is stale and gets pruned
//! during fan-out.
//!
//! One coarse `RwLock` serializes all mutation. Critical sections are
//! plain map operations and the lock is never held across an await, which
//! is what makes upsert-or-create and first-writer-wins hash adoption
//! atomic: two concurrent first jobs for the same actor converge on a
//! single instance.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::platform::Platform;
use crate::socket::ClientSocket;
use crate::types::{Actor, SocketId};

/// A live adapter session, possibly shared across sockets that
/// authenticate as the same actor.
#[derive(Clone)]
pub struct PlatformInstance {
    /// Instance identifier, generated at creation.
    pub id: Uuid,
    /// Platform (adapter type) name.
    pub name: String,
    /// Identity this instance acts as.
    pub actor: Actor,
    /// The instantiated adapter.
    pub module: Arc<dyn Platform>,
    /// Digest of the credential payload last verified against this
    /// instance. Set on first successful verification; immutable afterward
    /// except via the credential-update protocol.
    pub credentials_hash: Option<String>,
    /// Advisory teardown flag reserved for an external reaper. No core
    /// path drives it.
    pub flagged_for_termination: bool,
    /// Socket ids currently interested in this instance's output.
    pub sockets: HashSet<SocketId>,
}

impl PlatformInstance {
    /// Build a fresh, unpersisted instance with no adopted credentials
    /// hash and no interested sockets.
    pub fn new(id: Uuid, name: impl Into<String>, actor: Actor, module: Arc<dyn Platform>) -> Self {
        Self {
            id,
            name: name.into(),
            actor,
            module,
            credentials_hash: None,
            flagged_for_termination: false,
            sockets: HashSet::new(),
        }
    }
}

impl std::fmt::Debug for PlatformInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("actor", &self.actor)
            .field("credentials_hash", &self.credentials_hash)
            .field("flagged_for_termination", &self.flagged_for_termination)
            .field("sockets", &self.sockets)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryInner {
    /// Actor identity → instance id resolution shortcut.
    actors: HashMap<String, Uuid>,
    /// Authoritative instance store.
    instances: HashMap<Uuid, PlatformInstance>,
    /// Socket liveness table.
    sockets: HashMap<SocketId, Arc<dyn ClientSocket>>,
}

/// Cloneable handle to the process-wide registry.
///
/// Workers read and mutate it through these methods only; reads hand out
/// snapshots (instance clones), never references into the lock.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl SharedRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the instance persisted for an actor identity, if any.
    pub fn resolve_actor(&self, actor_id: &str) -> Option<PlatformInstance> {
        let inner = self.read();
        let id = inner.actors.get(actor_id)?;
        inner.instances.get(id).cloned()
    }

    /// Look up an instance by id.
    pub fn instance(&self, id: Uuid) -> Option<PlatformInstance> {
        self.read().instances.get(&id).cloned()
    }

    /// Number of persisted instances.
    pub fn instance_count(&self) -> usize {
        self.read().instances.len()
    }

    /// Persist an instance and register `socket_id`'s interest, atomically.
    ///
    /// Compare-and-insert: when another worker already persisted an
    /// instance for the same actor, that incumbent wins — the socket is
    /// registered on it and the incumbent is returned. Repeated upserts
    /// for an already-persisted instance only add the socket; adopted
    /// state (credentials hash, other sockets) is left alone. The caller
    /// must continue with the returned snapshot.
    pub fn persist(&self, instance: &PlatformInstance, socket_id: &SocketId) -> PlatformInstance {
        let mut inner = self.write();

        let resolved_id = match inner.actors.get(&instance.actor.id) {
            Some(existing) if inner.instances.contains_key(existing) => *existing,
            _ => instance.id,
        };

        if resolved_id == instance.id && !inner.instances.contains_key(&instance.id) {
            inner.actors.insert(instance.actor.id.clone(), instance.id);
            inner.instances.insert(instance.id, instance.clone());
        }

        // resolved_id is guaranteed present at this point
        let record = inner
            .instances
            .get_mut(&resolved_id)
            .unwrap_or_else(|| unreachable!("instance {resolved_id} inserted above"));
        record.sockets.insert(socket_id.clone());
        record.clone()
    }

    /// First-writer-wins credentials-hash adoption.
    ///
    /// Sets the hash when none is adopted yet and returns the winning
    /// value; an already-adopted hash is returned unchanged. For an
    /// instance that is not persisted (already torn down), the candidate
    /// wins by default.
    pub fn adopt_credentials_hash(&self, id: Uuid, digest: &str) -> String {
        let mut inner = self.write();
        match inner.instances.get_mut(&id) {
            Some(record) => record
                .credentials_hash
                .get_or_insert_with(|| digest.to_owned())
                .clone(),
            None => digest.to_owned(),
        }
    }

    /// Rewrite an instance's actor identity and credentials hash, and
    /// index the actor → instance mapping under the new identity.
    ///
    /// Only the credential-update protocol calls this. Returns `false`
    /// when the instance no longer exists.
    pub fn rewrite_actor(&self, id: Uuid, new_actor: Actor, new_hash: String) -> bool {
        let mut inner = self.write();
        let Some(record) = inner.instances.get_mut(&id) else {
            return false;
        };
        record.actor = new_actor.clone();
        record.credentials_hash = Some(new_hash);
        inner.actors.insert(new_actor.id, id);
        true
    }

    /// Set the advisory teardown flag on an instance.
    pub fn set_flagged_for_termination(&self, id: Uuid, flagged: bool) {
        if let Some(record) = self.write().instances.get_mut(&id) {
            record.flagged_for_termination = flagged;
        }
    }

    /// Remove an instance and every actor mapping pointing at it.
    pub fn remove_instance(&self, id: Uuid) -> Option<PlatformInstance> {
        let mut inner = self.write();
        inner.actors.retain(|_, mapped| *mapped != id);
        inner.instances.remove(&id)
    }

    /// Register a live socket handle under its own id.
    pub fn register_socket(&self, handle: Arc<dyn ClientSocket>) {
        let id = handle.id().to_owned();
        self.write().sockets.insert(id, handle);
    }

    /// Look up a live socket handle.
    pub fn socket(&self, id: &SocketId) -> Option<Arc<dyn ClientSocket>> {
        self.read().sockets.get(id).cloned()
    }

    /// Whether a socket id has a live handle.
    pub fn has_socket(&self, id: &SocketId) -> bool {
        self.read().sockets.contains_key(id)
    }

    /// Drop a stale socket reference from the liveness table and from one
    /// instance's interest set.
    pub fn prune_socket(&self, instance_id: Uuid, socket_id: &SocketId) {
        let mut inner = self.write();
        inner.sockets.remove(socket_id);
        if let Some(record) = inner.instances.get_mut(&instance_id) {
            record.sockets.remove(socket_id);
        }
    }

    /// Detach a socket from the whole registry: every instance's interest
    /// set and the liveness table. Instances themselves survive.
    ///
    /// This is the worker shutdown path; it is idempotent.
    pub fn detach_socket(&self, socket_id: &SocketId) {
        let mut inner = self.write();
        for record in inner.instances.values_mut() {
            record.sockets.remove(socket_id);
        }
        inner.sockets.remove(socket_id);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
