//! Symmetric encryption of session payloads.
//!
//! Payloads are sealed into an envelope:
//!
//! ```text
//! base64( base64(ciphertext) || "::" || iv )
//! ```
//!
//! The inner ciphertext is base64 text, so the first `::` in the decoded
//! envelope always marks the start of the IV. Empty plaintext maps to an
//! empty envelope and back.

mod methods;

pub use methods::{CATALOGUE, CipherPolicy, DEFAULT_METHOD, Method};

use crate::error::{SessionError, SessionResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use methods::TransformError;
use rand::TryRngCore;
use rand::rngs::OsRng;
use satchel_log::debug;

const SEPARATOR: &[u8] = b"::";

/// Key, method and policy for sealing session payloads.
///
/// # Examples
///
/// ```
/// use satchel_session::Encryption;
///
/// let mut encryption = Encryption::new();
/// encryption.set_key("a secret key");
/// encryption.set_method("aes-128-ctr").unwrap();
///
/// let envelope = encryption.encrypt(b"user=42").unwrap();
/// assert_eq!(encryption.decrypt(&envelope).unwrap(), b"user=42");
/// assert!(encryption.encrypt(b"").unwrap().is_empty());
/// ```
#[derive(Clone)]
pub struct Encryption {
    key: Vec<u8>,
    method: Method,
    policy: CipherPolicy,
}

impl std::fmt::Debug for Encryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryption")
            .field("key", &"<redacted>")
            .field("method", &self.method.name())
            .finish()
    }
}

impl Default for Encryption {
    fn default() -> Self {
        Self::new()
    }
}

impl Encryption {
    /// No key, default method, default policy.
    pub fn new() -> Self {
        Self::with_policy(CipherPolicy::default())
    }

    /// No key, default method, custom exclusion policy.
    pub fn with_policy(policy: CipherPolicy) -> Self {
        Self {
            key: Vec::new(),
            method: Method::default(),
            policy,
        }
    }

    /// Set the key. An empty key makes `encrypt`/`decrypt` fail.
    pub fn set_key(&mut self, key: impl AsRef<[u8]>) {
        self.key = key.as_ref().to_vec();
    }

    /// Select the cipher by name; it must be one of [`available_methods`](Self::available_methods).
    pub fn set_method(&mut self, name: &str) -> SessionResult<()> {
        if !self.available_methods().contains(&name) {
            return Err(SessionError::Configuration(format!("Unknown method: {}", name)));
        }
        self.method = Method::lookup(name)
            .ok_or_else(|| SessionError::Configuration(format!("Unknown method: {}", name)))?;
        Ok(())
    }

    pub fn method(&self) -> &'static str {
        self.method.name()
    }

    /// Cipher names usable under the current policy.
    pub fn available_methods(&self) -> Vec<&'static str> {
        self.policy.available()
    }

    /// Seal `data` into an envelope.
    pub fn encrypt(&self, data: &[u8]) -> SessionResult<Vec<u8>> {
        self.ensure_key()?;
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let mut iv = vec![0u8; self.method.iv_len()];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| SessionError::Crypto(format!("could not generate IV: {}", e)))?;

        let ciphertext = self
            .method
            .encrypt(&self.key, &iv, data)
            .map_err(|e| self.failure("encrypt", e))?;

        let mut inner = STANDARD.encode(ciphertext).into_bytes();
        inner.extend_from_slice(SEPARATOR);
        inner.extend_from_slice(&iv);
        Ok(STANDARD.encode(inner).into_bytes())
    }

    /// Open an envelope produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, envelope: &[u8]) -> SessionResult<Vec<u8>> {
        self.ensure_key()?;
        if envelope.is_empty() {
            return Ok(Vec::new());
        }

        let inner = STANDARD
            .decode(envelope)
            .map_err(|_| SessionError::Crypto("could not decrypt session: malformed envelope".into()))?;
        let split = inner
            .windows(SEPARATOR.len())
            .position(|w| w == SEPARATOR)
            .ok_or_else(|| SessionError::Crypto("could not decrypt session: missing IV".into()))?;
        let (encoded, rest) = inner.split_at(split);
        let iv = &rest[SEPARATOR.len()..];

        if iv.len() != self.method.iv_len() {
            return Err(SessionError::Crypto(
                "could not decrypt session: IV has the wrong length".into(),
            ));
        }
        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|_| SessionError::Crypto("could not decrypt session: malformed ciphertext".into()))?;

        self.method
            .decrypt(&self.key, iv, &ciphertext)
            .map_err(|e| self.failure("decrypt", e))
    }

    fn ensure_key(&self) -> SessionResult<()> {
        if self.key.is_empty() {
            return Err(SessionError::Crypto("Key has to be a non-empty string".into()));
        }
        Ok(())
    }

    fn failure(&self, action: &str, err: TransformError) -> SessionError {
        debug!("{} with {} failed: {:?}", action, self.method.name(), err);
        SessionError::Crypto(format!("could not {} session with {}", action, self.method.name()))
    }
}
