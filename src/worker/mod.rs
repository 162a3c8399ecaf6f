//! Per-socket worker: the job-consumption loop.
//!
//! One worker per client socket connection. It owns that socket's job
//! stream, the instance-sharing decision, the credential-verification
//! gate, and outbound fan-out for the platform instances it has joined.

pub(crate) mod gate;
pub mod outbound;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HubSecrets;
use crate::crypto::{self, CryptoError, SealKey};
use crate::invoker::{self, FailureHook};
use crate::platform::{CatalogError, PlatformCatalog, PlatformContext, PlatformError};
use crate::queue::JobRequest;
use crate::registry::{PlatformInstance, SharedRegistry};
use crate::socket::ClientSocket;
use crate::store::{CredentialStore, StoreError};
use crate::types::{ActivityMessage, Job, SocketId};
use crate::worker::outbound::{CredentialUpdater, OutboundSender};

/// Job-level failures reported through the completion channel.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The job payload could not be opened with the hub's job key.
    #[error("could not decrypt job payload: {0}")]
    Decrypt(#[from] CryptoError),
    /// The decrypted payload is not a valid activity message.
    #[error("could not decode activity message: {0}")]
    Decode(String),
    /// No adapter is registered for the message's context.
    #[error("no platform registered for context '{0}'")]
    UnknownPlatform(String),
    /// Credentials could not be fetched for a persist-flagged instance.
    #[error("could not get credentials for actor {actor}: {source}")]
    Credentials {
        /// Actor the fetch was for.
        actor: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
    /// Submitted credentials hash differently than the instance's adopted
    /// digest.
    #[error("provided credentials do not match existing platform instance for actor {0}")]
    CredentialMismatch(String),
    /// The adapter failed in a controlled way; the instance survives.
    #[error(transparent)]
    Platform(#[from] PlatformError),
    /// The adapter crashed or timed out; the instance was torn down.
    #[error("{0}")]
    PlatformFailure(String),
    /// The worker's job channel closed before the job completed.
    #[error("worker is gone, job {0} was not processed")]
    WorkerGone(String),
}

/// Everything a worker needs at construction.
pub struct WorkerConfig {
    /// Identifier of the owning hub process, used for log scoping.
    pub hub_id: String,
    /// This connection's socket handle; registered into the registry.
    pub socket: Arc<dyn ClientSocket>,
    /// Hub secrets; the worker derives its job key and drops them.
    pub secrets: HubSecrets,
    /// Process-wide shared registry.
    pub registry: SharedRegistry,
    /// Credential store scoped to this socket connection.
    pub store: Arc<dyn CredentialStore>,
    /// Available adapter types.
    pub catalog: Arc<PlatformCatalog>,
    /// Hard deadline for one adapter invocation.
    pub job_timeout: Duration,
}

/// One client socket connection's job processor.
pub struct Worker {
    hub_id: String,
    socket_id: SocketId,
    job_key: SealKey,
    registry: SharedRegistry,
    store: Arc<dyn CredentialStore>,
    catalog: Arc<PlatformCatalog>,
    job_timeout: Duration,
    on_failure: Mutex<FailureHook>,
}

impl Worker {
    /// Build a worker and register its socket handle in the registry.
    ///
    /// The hub secrets are reduced to the derived job key here; the worker
    /// never exposes them (or the key) through its API.
    pub fn new(config: WorkerConfig) -> Self {
        let socket_id = config.socket.id().to_owned();
        config.registry.register_socket(Arc::clone(&config.socket));
        info!(hub = %config.hub_id, socket = %socket_id, "worker ready");

        Self {
            hub_id: config.hub_id,
            socket_id,
            job_key: config.secrets.job_key(),
            registry: config.registry,
            store: config.store,
            catalog: config.catalog,
            job_timeout: config.job_timeout,
            on_failure: Mutex::new(Arc::new(|_| {})),
        }
    }

    /// This worker's socket id.
    pub fn socket_id(&self) -> &SocketId {
        &self.socket_id
    }

    /// Register the hook invoked whenever an adapter is torn down after a
    /// fault or timeout. Replaces any previous hook.
    pub fn on_failure<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.hook_slot() = Arc::new(hook);
    }

    /// Consume this socket's job stream until the channel closes.
    ///
    /// Each job's completion channel is answered exactly once, in arrival
    /// order.
    pub async fn run(&self, mut jobs: mpsc::Receiver<JobRequest>) {
        info!(socket = %self.socket_id, "listening for jobs");
        while let Some(request) = jobs.recv().await {
            let outcome = self.process(request.job).await;
            if request.done.send(outcome).is_err() {
                warn!(socket = %self.socket_id, "job completion dropped by broker side");
            }
        }
        debug!(socket = %self.socket_id, "job stream closed");
    }

    /// Process one job: decrypt, resolve or create the platform instance,
    /// gate on credentials, and dispatch under crash isolation.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkerError`] describing the first failing step; see
    /// the variant docs for which failures destroy the instance.
    pub async fn process(&self, job: Job) -> Result<Option<serde_json::Value>, WorkerError> {
        let plaintext = crypto::open(&self.job_key, &job.data.msg)?;
        let message: ActivityMessage =
            serde_json::from_slice(&plaintext).map_err(|e| WorkerError::Decode(e.to_string()))?;
        debug!(
            hub = %self.hub_id,
            socket = %self.socket_id,
            job = %job.id,
            verb = %message.verb,
            "got job"
        );

        let mut instance = match self.registry.resolve_actor(&message.actor.id) {
            Some(existing) => existing,
            None => self.create_instance(&message)?,
        };

        let credentials = gate::fetch_and_verify(
            self.store.as_ref(),
            &self.registry,
            &mut instance,
            &self.socket_id,
        )
        .await?;

        let sender = OutboundSender::new(
            self.registry.clone(),
            instance.id,
            self.socket_id.clone(),
        );
        invoker::invoke(
            &self.registry,
            &sender,
            &instance,
            &message,
            credentials,
            self.job_timeout,
            self.failure_hook(),
        )
        .await
    }

    /// Detach this worker's socket from the registry: removed from every
    /// instance's interest set and from the liveness table. Instances are
    /// not destroyed by a socket leaving. Idempotent.
    pub fn shutdown(&self) {
        debug!(socket = %self.socket_id, "shutting down");
        self.registry.detach_socket(&self.socket_id);
    }

    /// Synthesize a fresh, unpersisted instance for a message's actor,
    /// wiring the adapter with its outbound handles.
    fn create_instance(&self, message: &ActivityMessage) -> Result<PlatformInstance, WorkerError> {
        debug!(
            platform = %message.context,
            actor = %message.actor.id,
            "creating new platform instance"
        );

        let id = Uuid::new_v4();
        let context = PlatformContext {
            platform: message.context.clone(),
            instance_id: id,
            sender: OutboundSender::new(self.registry.clone(), id, self.socket_id.clone()),
            credentials: CredentialUpdater::new(
                self.registry.clone(),
                Arc::clone(&self.store),
                id,
                self.socket_id.clone(),
            ),
        };

        let module = self
            .catalog
            .construct(&message.context, context)
            .map_err(|e| match e {
                CatalogError::Unknown(name) => WorkerError::UnknownPlatform(name),
            })?;

        Ok(PlatformInstance::new(
            id,
            message.context.clone(),
            message.actor.clone(),
            module,
        ))
    }

    fn failure_hook(&self) -> FailureHook {
        Arc::clone(&self.hook_slot())
    }

    fn hook_slot(&self) -> std::sync::MutexGuard<'_, FailureHook> {
        self.on_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
