//! Encryption at rest for any store.

use crate::crypto::{CipherPolicy, Encryption};
use crate::error::SessionResult;
use crate::traits::{DriverKind, PrefixedStore, SessionDriver, UserScopedStore};
use async_trait::async_trait;

/// Wraps a store so payloads are sealed before they reach it and opened
/// after they leave it.
///
/// # Examples
///
/// ```
/// use satchel_session::{Encrypted, NativeStore, SessionDriver};
///
/// # #[tokio::main]
/// # async fn main() -> satchel_session::SessionResult<()> {
/// let backend = NativeStore::new();
/// let mut store = Encrypted::new(backend.clone(), "a secret key");
/// store.set_method("aes-128-cbc")?;
///
/// store.write("abc", b"user=42").await?;
/// assert_eq!(store.read("abc").await?, b"user=42");
/// assert_ne!(backend.read("abc").await?, b"user=42");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Encrypted<S> {
    inner: S,
    encryption: Encryption,
}

impl<S: SessionDriver> Encrypted<S> {
    /// Wrap `inner` with the default method and policy.
    pub fn new(inner: S, key: impl AsRef<[u8]>) -> Self {
        let mut encryption = Encryption::new();
        encryption.set_key(key);
        Self { inner, encryption }
    }

    /// Wrap `inner` with a prepared [`Encryption`].
    pub fn with_encryption(inner: S, encryption: Encryption) -> Self {
        Self { inner, encryption }
    }

    /// Wrap `inner` under a custom cipher policy.
    pub fn with_policy(inner: S, key: impl AsRef<[u8]>, policy: CipherPolicy) -> Self {
        let mut encryption = Encryption::with_policy(policy);
        encryption.set_key(key);
        Self { inner, encryption }
    }

    /// Replace the encryption key.
    pub fn set_key(&mut self, key: impl AsRef<[u8]>) {
        self.encryption.set_key(key);
    }

    /// Switch cipher. Fails for names the policy refuses.
    pub fn set_method(&mut self, name: &str) -> SessionResult<()> {
        self.encryption.set_method(name)
    }

    /// Name of the cipher in use.
    pub fn method(&self) -> &'static str {
        self.encryption.method()
    }

    /// Cipher names the policy allows.
    pub fn available_methods(&self) -> Vec<&'static str> {
        self.encryption.available_methods()
    }

    pub fn encryption(&self) -> &Encryption {
        &self.encryption
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap the store.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: SessionDriver> SessionDriver for Encrypted<S> {
    fn kind(&self) -> DriverKind {
        self.inner.kind()
    }

    fn is_encrypted(&self) -> bool {
        true
    }

    async fn open(&mut self, save_path: &str, name: &str) -> SessionResult<bool> {
        self.inner.open(save_path, name).await
    }

    async fn close(&self) -> SessionResult<bool> {
        self.inner.close().await
    }

    async fn read(&self, id: &str) -> SessionResult<Vec<u8>> {
        let sealed = self.inner.read(id).await?;
        self.encryption.decrypt(&sealed)
    }

    async fn write(&self, id: &str, data: &[u8]) -> SessionResult<bool> {
        let sealed = self.encryption.encrypt(data)?;
        self.inner.write(id, &sealed).await
    }

    async fn destroy(&self, id: &str) -> SessionResult<bool> {
        self.inner.destroy(id).await
    }

    async fn gc(&self, max_lifetime: i64) -> SessionResult<bool> {
        self.inner.gc(max_lifetime).await
    }

    async fn validate_id(&self, id: &str) -> SessionResult<bool> {
        self.inner.validate_id(id).await
    }

    // The payload is sealed here too; plaintext must never reach the store.
    async fn update_timestamp(&self, id: &str, data: &[u8]) -> SessionResult<bool> {
        let sealed = self.encryption.encrypt(data)?;
        self.inner.update_timestamp(id, &sealed).await
    }

    async fn create_id(&self) -> SessionResult<String> {
        self.inner.create_id().await
    }

    fn as_user_scoped(&mut self) -> Option<&mut dyn UserScopedStore> {
        self.inner.as_user_scoped()
    }

    fn as_prefixed(&mut self) -> Option<&mut dyn PrefixedStore> {
        self.inner.as_prefixed()
    }
}
