//! Shared fixture: an in-process hub with a recording platform adapter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchboard::config::HubSecrets;
use switchboard::crypto;
use switchboard::platform::{
    Platform, PlatformCatalog, PlatformConfig, PlatformContext, PlatformError,
};
use switchboard::registry::SharedRegistry;
use switchboard::socket::ChannelSocket;
use switchboard::store::{CredentialStore, EncryptedMemoryStore, StoreBacking};
use switchboard::types::{ActivityMessage, Actor, CredentialRecord, Job, JobData};
use switchboard::worker::{Worker, WorkerConfig};
use tokio::sync::mpsc;

pub const HUB_ID: &str = "hub-test";

/// How the recording adapter reacts to verb invocations.
#[derive(Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Hang,
}

/// Observable trace of everything the adapter saw.
#[derive(Default)]
pub struct Recording {
    pub calls: Mutex<Vec<(String, ActivityMessage, Option<CredentialRecord>)>>,
    pub cleanups: Mutex<usize>,
    pub context: Mutex<Option<PlatformContext>>,
}

impl Recording {
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn cleanup_count(&self) -> usize {
        *self.cleanups.lock().expect("cleanups lock")
    }

    pub fn context(&self) -> PlatformContext {
        self.context
            .lock()
            .expect("context lock")
            .clone()
            .expect("platform constructed")
    }
}

struct RecordingPlatform {
    persist: bool,
    behavior: Behavior,
    recording: Arc<Recording>,
}

#[async_trait::async_trait]
impl Platform for RecordingPlatform {
    fn config(&self) -> PlatformConfig {
        PlatformConfig {
            persist: self.persist,
        }
    }

    async fn handle(
        &self,
        verb: &str,
        message: &ActivityMessage,
        credentials: Option<&CredentialRecord>,
    ) -> Result<Option<serde_json::Value>, PlatformError> {
        self.recording.calls.lock().expect("calls lock").push((
            verb.to_owned(),
            message.clone(),
            credentials.cloned(),
        ));
        match self.behavior {
            Behavior::Succeed => Ok(Some(serde_json::json!({"status": true}))),
            Behavior::Fail => Err(PlatformError::Failed("refused by platform".to_owned())),
            Behavior::Panic => panic!("adapter blew up"),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(None)
            }
        }
    }

    async fn cleanup(&self) -> Result<(), PlatformError> {
        let mut cleanups = self.recording.cleanups.lock().expect("cleanups lock");
        *cleanups = cleanups.saturating_add(1);
        Ok(())
    }
}

/// One in-process hub: registry, shared store backing, and an `email`
/// platform whose instances all report into the same [`Recording`].
pub struct TestHub {
    pub registry: SharedRegistry,
    pub backing: StoreBacking,
    pub catalog: Arc<PlatformCatalog>,
    pub secrets: HubSecrets,
    pub recording: Arc<Recording>,
}

impl TestHub {
    pub fn new(persist: bool, behavior: Behavior) -> Self {
        let recording = Arc::new(Recording::default());

        let mut catalog = PlatformCatalog::new();
        let factory_recording = Arc::clone(&recording);
        catalog.register("email", move |context: PlatformContext| {
            *factory_recording.context.lock().expect("context lock") = Some(context);
            Arc::new(RecordingPlatform {
                persist,
                behavior,
                recording: Arc::clone(&factory_recording),
            }) as Arc<dyn Platform>
        });

        Self {
            registry: SharedRegistry::new(),
            backing: StoreBacking::default(),
            catalog: Arc::new(catalog),
            secrets: HubSecrets::new("root-secret", "session-secret", "worker-secret"),
            recording,
        }
    }

    /// Build a worker for one socket; the returned receiver is the
    /// client's side of the connection.
    pub fn worker(&self, socket: &str) -> (Worker, mpsc::UnboundedReceiver<ActivityMessage>) {
        let (handle, rx) = ChannelSocket::new(socket);
        let store = Arc::new(EncryptedMemoryStore::with_backing(
            HUB_ID,
            &socket.to_owned(),
            self.secrets.store_key(),
            self.backing.clone(),
        ));

        let worker = Worker::new(WorkerConfig {
            hub_id: HUB_ID.to_owned(),
            socket: handle,
            secrets: self.secrets.clone(),
            registry: self.registry.clone(),
            store,
            catalog: Arc::clone(&self.catalog),
            job_timeout: Duration::from_secs(60),
        });
        (worker, rx)
    }

    /// Store credentials the way the transport layer would for one socket.
    pub async fn save_credentials(&self, socket: &str, actor: &str, object: serde_json::Value) {
        let store = EncryptedMemoryStore::with_backing(
            HUB_ID,
            &socket.to_owned(),
            self.secrets.store_key(),
            self.backing.clone(),
        );
        let record = CredentialRecord {
            actor: Actor::new(actor),
            object,
        };
        store.save(actor, &record).await.expect("save credentials");
    }

    /// Seal an activity message into a job the broker would deliver.
    pub fn job(&self, id: &str, message: &serde_json::Value) -> Job {
        let plaintext = serde_json::to_vec(message).expect("encode message");
        let sealed = crypto::seal(&self.secrets.job_key(), &plaintext).expect("seal message");
        Job {
            id: id.to_owned(),
            data: JobData { msg: sealed },
        }
    }
}

/// A `send` message for the `email` platform, in wire shape.
pub fn send_message(actor: &str) -> serde_json::Value {
    serde_json::json!({
        "@type": "send",
        "context": "email",
        "actor": {"@id": actor},
        "object": {"subject": "test email subject", "text": "test email body"},
        "target": {"to": [{"address": "user2@example.com"}]},
    })
}

/// Default credential payload used across the suites.
pub fn smtp_credentials() -> serde_json::Value {
    serde_json::json!({
        "username": "user",
        "password": "secretcode",
        "host": "example.com",
    })
}
