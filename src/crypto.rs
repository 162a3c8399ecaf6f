//! Sealed-envelope encryption for job payloads and stored credentials.
//!
//! Envelope format: `enc:v1:<nonce>:<ciphertext>` with URL-safe base64
//! parts. Keys are derived from pairs of hub secrets, so neither secret is
//! ever used as key material on its own.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Envelope prefix identifying the sealing scheme and version.
const ENVELOPE_PREFIX: &str = "enc:v1:";

/// AEAD nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Symmetric key used to seal and open envelopes.
pub type SealKey = [u8; 32];

/// Errors produced while sealing or opening envelopes.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The blob is not a well-formed `enc:v1` envelope.
    #[error("invalid sealed envelope: {0}")]
    InvalidEnvelope(String),
    /// Cipher initialization or encryption failed.
    #[error("could not seal payload: {0}")]
    Seal(String),
    /// Authentication or decryption failed (wrong key or tampered data).
    #[error("could not open sealed payload")]
    Open,
}

/// Derive a 32-byte seal key from two hub secrets.
///
/// The digest runs over `<a>:<b>` so swapping the secrets yields a
/// different key.
pub fn derive_key(a: &str, b: &str) -> SealKey {
    let mut hasher = Sha256::new();
    hasher.update(a.as_bytes());
    hasher.update(b":");
    hasher.update(b.as_bytes());
    hasher.finalize().into()
}

/// Seal a plaintext into an `enc:v1` envelope.
///
/// The nonce is drawn from fresh UUID bytes, so every envelope is unique
/// even for identical plaintexts.
pub fn seal(key: &SealKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    let nonce_source = Uuid::new_v4();
    let nonce_bytes = nonce_source
        .as_bytes()
        .get(..NONCE_LEN)
        .ok_or_else(|| CryptoError::Seal("nonce source too short".to_owned()))?;
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|e| CryptoError::Seal(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Seal(e.to_string()))?;

    Ok(format!(
        "{ENVELOPE_PREFIX}{}:{}",
        URL_SAFE_NO_PAD.encode(nonce_bytes),
        URL_SAFE_NO_PAD.encode(ciphertext)
    ))
}

/// Open an `enc:v1` envelope previously produced by [`seal`].
///
/// # Errors
///
/// Returns [`CryptoError::InvalidEnvelope`] when the blob does not parse,
/// and [`CryptoError::Open`] when the key is wrong or the ciphertext was
/// tampered with.
pub fn open(key: &SealKey, blob: &str) -> Result<Vec<u8>, CryptoError> {
    let body = blob
        .strip_prefix(ENVELOPE_PREFIX)
        .ok_or_else(|| CryptoError::InvalidEnvelope("missing enc:v1 prefix".to_owned()))?;

    let mut parts = body.split(':');
    let nonce_b64 = parts
        .next()
        .ok_or_else(|| CryptoError::InvalidEnvelope("missing nonce".to_owned()))?;
    let ciphertext_b64 = parts
        .next()
        .ok_or_else(|| CryptoError::InvalidEnvelope("missing ciphertext".to_owned()))?;
    if parts.next().is_some() {
        return Err(CryptoError::InvalidEnvelope(
            "unexpected trailing envelope parts".to_owned(),
        ));
    }

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(nonce_b64.as_bytes())
        .map_err(|e| CryptoError::InvalidEnvelope(format!("bad nonce encoding: {e}")))?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(CryptoError::InvalidEnvelope("bad nonce length".to_owned()));
    }
    let ciphertext = URL_SAFE_NO_PAD
        .decode(ciphertext_b64.as_bytes())
        .map_err(|e| CryptoError::InvalidEnvelope(format!("bad ciphertext encoding: {e}")))?;

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|e| CryptoError::Seal(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| CryptoError::Open)
}

/// Hex-encoded SHA-256 digest of a JSON value.
///
/// Used for the credentials hash: `serde_json` keeps object keys sorted,
/// so equal payloads digest equally regardless of submission order.
pub fn digest(value: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    let bytes = hasher.finalize();
    let mut out = String::with_capacity(64);
    use std::fmt::Write as _;
    for byte in bytes {
        // write! into a String cannot fail
        let _ = write!(out, "{byte:02x}");
    }
    out
}
