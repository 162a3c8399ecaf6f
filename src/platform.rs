//! Platform adapter seam.
//!
//! Adapters are polymorphic plugins implementing one external protocol's
//! verbs. The core calls exactly three entry points: construction (through
//! a [`PlatformCatalog`] factory), the verb handler, and `cleanup`. The
//! declared `persist` flag decides whether instances are shared across
//! socket connections or private to a single call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{ActivityMessage, CredentialRecord};
use crate::worker::outbound::{CredentialUpdater, OutboundSender};

/// Adapter-type configuration, fixed at adapter-type granularity.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformConfig {
    /// Whether instances of this adapter are persisted into the shared
    /// registry and reused across socket connections.
    pub persist: bool,
}

/// Controlled failures an adapter hands back to the core.
///
/// These fail the current job only; they never tear the instance down.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The adapter does not implement the requested verb.
    #[error("platform does not support verb '{0}'")]
    UnsupportedVerb(String),
    /// The verb handler failed in a controlled way.
    #[error("{0}")]
    Failed(String),
}

/// One platform adapter instance.
///
/// Implementations must not panic in normal operation; a panic is treated
/// as a crash and destroys the instance.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Adapter-type configuration.
    fn config(&self) -> PlatformConfig;

    /// Handle one verb invocation.
    ///
    /// `credentials` is the record verified for this instance's actor, or
    /// `None` when the adapter type needs none.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] for controlled failures; the job fails
    /// but the instance survives.
    async fn handle(
        &self,
        verb: &str,
        message: &ActivityMessage,
        credentials: Option<&CredentialRecord>,
    ) -> Result<Option<serde_json::Value>, PlatformError>;

    /// Release adapter-held resources before the instance is destroyed.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller; teardown continues regardless.
    async fn cleanup(&self) -> Result<(), PlatformError>;
}

/// Everything an adapter gets handed at construction time.
///
/// The sender and updater are the only channels by which an adapter
/// communicates outward.
#[derive(Clone)]
pub struct PlatformContext {
    /// Platform name this instance was constructed for.
    pub platform: String,
    /// Identifier of the platform instance being constructed.
    pub instance_id: Uuid,
    /// Outbound message fan-out, bound to this instance.
    pub sender: OutboundSender,
    /// Credential-update protocol handle, bound to this instance.
    pub credentials: CredentialUpdater,
}

/// Factory constructing one adapter instance from its context.
pub type PlatformFactory = Arc<dyn Fn(PlatformContext) -> Arc<dyn Platform> + Send + Sync>;

/// Errors resolving a platform factory.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No factory registered under the requested platform name.
    #[error("no platform registered for context '{0}'")]
    Unknown(String),
}

/// Table of available adapter types, keyed by platform name.
///
/// Populated once at bootstrap from whatever plugins the process ships
/// with; workers only read it.
#[derive(Default)]
pub struct PlatformCatalog {
    factories: HashMap<String, PlatformFactory>,
}

impl PlatformCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter factory under a platform name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(PlatformContext) -> Arc<dyn Platform> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Whether a platform name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Construct a new adapter instance for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unknown`] when no factory is registered.
    pub fn construct(
        &self,
        name: &str,
        context: PlatformContext,
    ) -> Result<Arc<dyn Platform>, CatalogError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| CatalogError::Unknown(name.to_owned()))?;
        Ok(factory(context))
    }
}
