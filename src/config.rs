//! Configuration loading and hub secrets.
//!
//! Tunables load from `switchboard.toml` (or `$SWITCHBOARD_CONFIG_PATH`)
//! with environment variables taking precedence over file values, and file
//! values over defaults. The three hub secrets are never part of the config
//! file; they load from the process environment (optionally seeded from a
//! `.env` file) and never serialize.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crypto::{self, SealKey};

/// Default adapter-call deadline in seconds.
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 60;

/// Default per-socket job channel depth.
const DEFAULT_QUEUE_DEPTH: usize = 128;

/// Tunable hub configuration.
///
/// Path: `./switchboard.toml` or `$SWITCHBOARD_CONFIG_PATH`.
/// Precedence: env vars > config file > defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Hard deadline for one adapter verb invocation, in seconds.
    pub job_timeout_secs: u64,
    /// Capacity of each per-socket job channel.
    pub queue_depth: usize,
    /// Directory for JSON log files (production logging mode).
    pub logs_dir: PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl HubConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Adapter-call deadline as a [`std::time::Duration`].
    pub fn job_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.job_timeout_secs)
    }

    fn load_from_file() -> Result<Self> {
        let path = std::env::var("SWITCHBOARD_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("switchboard.toml"));

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: HubConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Apply environment-style overrides via a lookup closure.
    ///
    /// Split out from [`HubConfig::load`] so tests can inject values
    /// without touching the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SWITCHBOARD_JOB_TIMEOUT_SECS") {
            match value.parse() {
                Ok(parsed) => self.job_timeout_secs = parsed,
                Err(_) => {
                    tracing::warn!(value = %value, "ignoring unparsable job timeout override");
                }
            }
        }
        if let Some(value) = lookup("SWITCHBOARD_QUEUE_DEPTH") {
            match value.parse() {
                Ok(parsed) => self.queue_depth = parsed,
                Err(_) => {
                    tracing::warn!(value = %value, "ignoring unparsable queue depth override");
                }
            }
        }
        if let Some(value) = lookup("SWITCHBOARD_LOGS_DIR") {
            self.logs_dir = PathBuf::from(value);
        }
    }
}

/// A single hub secret. Never serialized; `Debug` output is redacted.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wrap a secret string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret. Use only for key derivation.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// The three process-level secrets the hub derives its keys from.
///
/// - job payloads seal under `root` + `session`
/// - credential stores seal under `root` + `worker`
///
/// Workers hold these privately and never expose them through their API.
#[derive(Debug, Clone)]
pub struct HubSecrets {
    root: SecretValue,
    session: SecretValue,
    worker: SecretValue,
}

impl HubSecrets {
    /// Build secrets directly. Intended for tests and embedding hosts.
    pub fn new(
        root: impl Into<String>,
        session: impl Into<String>,
        worker: impl Into<String>,
    ) -> Self {
        Self {
            root: SecretValue::new(root),
            session: SecretValue::new(session),
            worker: SecretValue::new(worker),
        }
    }

    /// Load secrets from the environment, optionally seeding it from a
    /// `.env` file first.
    ///
    /// Expected variables: `SWITCHBOARD_ROOT_SECRET`,
    /// `SWITCHBOARD_SESSION_SECRET`, `SWITCHBOARD_WORKER_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns an error when the `.env` file cannot be parsed or any of the
    /// three variables is missing.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        if let Some(path) = env_file {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load secrets from {}", path.display()))?;
        }

        let read = |key: &str| -> Result<SecretValue> {
            let value =
                std::env::var(key).with_context(|| format!("missing hub secret: {key}"))?;
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("hub secret {key} is empty"));
            }
            Ok(SecretValue::new(value))
        };

        Ok(Self {
            root: read("SWITCHBOARD_ROOT_SECRET")?,
            session: read("SWITCHBOARD_SESSION_SECRET")?,
            worker: read("SWITCHBOARD_WORKER_SECRET")?,
        })
    }

    /// Key used to open incoming job payloads.
    pub fn job_key(&self) -> SealKey {
        crypto::derive_key(self.root.expose(), self.session.expose())
    }

    /// Key used to seal per-socket credential stores.
    pub fn store_key(&self) -> SealKey {
        crypto::derive_key(self.root.expose(), self.worker.expose())
    }
}
