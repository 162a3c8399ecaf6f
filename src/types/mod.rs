// Wire types shared by the worker, registry, and platform seams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity on whose behalf a platform instance acts.
///
/// Serialized with ActivityStreams field names so the wire shape matches
/// what the transport layer produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable external identifier (e.g. `user@example.com` or
    /// `irc://nick@server`).
    #[serde(rename = "@id")]
    pub id: String,
    /// Human-readable display name, when known.
    #[serde(
        rename = "displayName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
}

impl Actor {
    /// Build an actor from a bare identifier with no display name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }
}

/// Normalized activity message routed through the hub.
///
/// `verb` names the adapter method to invoke; `context` names the platform.
/// `object` and `target` are verb-specific and opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityMessage {
    /// The verb to invoke on the platform adapter (e.g. `send`, `join`).
    #[serde(rename = "@type")]
    pub verb: String,
    /// Platform name this message is addressed to (e.g. `email`, `irc`).
    pub context: String,
    /// The actor this message acts as.
    pub actor: Actor,
    /// Verb-specific target (recipients, channel, etc.).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<serde_json::Value>,
    /// Verb-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
    /// Optional publication timestamp stamped by the origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
}

impl ActivityMessage {
    /// Build the `connect`-type error message fanned out to clients when a
    /// platform instance is torn down after a fault or timeout.
    ///
    /// `context` is left empty here; the outbound sender stamps it with the
    /// instance's platform name on delivery.
    pub fn connect_error(actor: Actor, description: &str) -> Self {
        Self {
            verb: "connect".to_owned(),
            context: String::new(),
            actor: actor.clone(),
            target: Some(serde_json::json!({
                "@id": actor.id,
                "displayName": actor.display_name,
            })),
            object: Some(serde_json::json!({
                "@type": "error",
                "content": description,
            })),
            published: None,
        }
    }
}

/// One unit of work dequeued from the per-socket job stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Broker-assigned job identifier, used only for logging.
    pub id: String,
    /// Job payload.
    pub data: JobData,
}

/// Payload of a [`Job`]: the activity message as a sealed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobData {
    /// Sealed [`ActivityMessage`], opened with the hub's job key.
    pub msg: String,
}

/// Credential record stored for one actor identity.
///
/// `object` is an adapter-specific secret payload (transport credentials,
/// tokens). It is persisted only as a sealed envelope and is redacted from
/// `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Actor this record belongs to.
    pub actor: Actor,
    /// Opaque secret payload.
    pub object: serde_json::Value,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("actor", &self.actor)
            .field("object", &"[REDACTED]")
            .finish()
    }
}

/// Identifier of one client socket connection.
pub type SocketId = String;
