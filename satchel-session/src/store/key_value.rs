//! Key-value session storage with native expiry.
//!
//! Records are stored under the bare session id. Every write sets an
//! absolute expiry of `now + lifetime`, so `gc` has nothing to do.

use crate::error::{BoxError, SessionError, SessionResult, StorageOp};
use crate::id::{MAX_CREATE_ATTEMPTS, SessionIds};
use crate::traits::{DriverKind, SessionDriver};
use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use chrono::Utc;
use satchel_log::{debug, error};
use std::fmt;

/// Lifetime used until one is configured, in seconds.
pub const DEFAULT_LIFETIME: i64 = 1440;

/// The subset of a key-value client the store needs.
#[async_trait]
pub trait KeyValueClient: Send + Sync {
    /// The value under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), BoxError>;

    /// Expire `key` at the given unix timestamp.
    async fn expire_at(&self, key: &str, unix_ts: i64) -> Result<(), BoxError>;

    /// Remove `key`. Missing keys are not an error.
    async fn del(&self, key: &str) -> Result<(), BoxError>;

    /// Whether `key` holds a value.
    async fn exists(&self, key: &str) -> Result<bool, BoxError>;
}

// Calls go through `AsyncCommands` explicitly; the method names overlap.
#[async_trait]
impl KeyValueClient for ConnectionManager {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        let mut conn = self.clone();
        Ok(AsyncCommands::get(&mut conn, key).await?)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), BoxError> {
        let mut conn = self.clone();
        let _: () = AsyncCommands::set(&mut conn, key, value).await?;
        Ok(())
    }

    async fn expire_at(&self, key: &str, unix_ts: i64) -> Result<(), BoxError> {
        let mut conn = self.clone();
        let _: () = AsyncCommands::expire_at(&mut conn, key, unix_ts).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), BoxError> {
        let mut conn = self.clone();
        let _: () = AsyncCommands::del(&mut conn, key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BoxError> {
        let mut conn = self.clone();
        Ok(AsyncCommands::exists(&mut conn, key).await?)
    }
}

/// Redis-backed session store.
///
/// # Examples
///
/// ```no_run
/// use satchel_session::{RedisStore, SessionDriver};
///
/// # async fn example() -> satchel_session::SessionResult<()> {
/// let mut store = RedisStore::connect("redis://localhost:6379").await?;
/// store.set_lifetime(3600);
///
/// let id = store.create_id().await?;
/// store.write(&id, b"payload").await?;
/// # Ok(())
/// # }
/// ```
pub struct RedisStore<C: KeyValueClient = ConnectionManager> {
    client: C,
    lifetime: i64,
    ids: SessionIds,
}

impl<C: KeyValueClient> fmt::Debug for RedisStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("lifetime", &self.lifetime)
            .field("ids", &self.ids)
            .finish()
    }
}

/// Check a key-value URL scheme.
pub fn validate_url(url: &str) -> SessionResult<()> {
    if !url.starts_with("redis://") && !url.starts_with("rediss://") {
        return Err(SessionError::InvalidUrl(
            "Redis URL must start with redis:// or rediss://".to_string(),
        ));
    }
    Ok(())
}

impl RedisStore<ConnectionManager> {
    /// Open a managed connection to `url`.
    pub async fn connect(url: &str) -> SessionResult<Self> {
        validate_url(url)?;
        let client =
            ::redis::Client::open(url).map_err(|e| SessionError::storage(StorageOp::Connect, e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SessionError::storage(StorageOp::Connect, e))?;
        debug!("connected key-value session store");
        Ok(Self::with_client(conn))
    }
}

impl<C: KeyValueClient> RedisStore<C> {
    /// Use an existing client.
    pub fn with_client(client: C) -> Self {
        Self {
            client,
            lifetime: DEFAULT_LIFETIME,
            ids: SessionIds::default(),
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Seconds a record lives after its last write.
    pub fn set_lifetime(&mut self, seconds: i64) {
        self.lifetime = seconds;
    }

    /// Seconds a record lives after its last write.
    pub fn lifetime(&self) -> i64 {
        self.lifetime
    }

    /// Set the length of ids issued by `create_id`.
    ///
    /// # Arguments
    ///
    /// * `length` - Number of characters, at least 32
    pub fn set_length_session_id(&mut self, length: usize) -> SessionResult<()> {
        self.ids = SessionIds::with_length(length)?;
        Ok(())
    }

    /// Length of ids issued by `create_id`.
    pub fn length_session_id(&self) -> usize {
        self.ids.length()
    }

    fn failure(op: StorageOp, err: BoxError) -> SessionError {
        error!("key-value store: {}: {}", op, err);
        SessionError::storage(op, err)
    }
}

#[async_trait]
impl<C: KeyValueClient> SessionDriver for RedisStore<C> {
    fn kind(&self) -> DriverKind {
        DriverKind::KeyValue
    }

    async fn open(&mut self, _save_path: &str, _name: &str) -> SessionResult<bool> {
        Ok(true)
    }

    async fn read(&self, id: &str) -> SessionResult<Vec<u8>> {
        let value = self
            .client
            .get(id)
            .await
            .map_err(|e| Self::failure(StorageOp::Read, e))?;
        Ok(value.unwrap_or_default())
    }

    async fn write(&self, id: &str, data: &[u8]) -> SessionResult<bool> {
        let expires = Utc::now().timestamp().saturating_add(self.lifetime);
        self.client
            .set(id, data)
            .await
            .map_err(|e| Self::failure(StorageOp::Write, e))?;
        self.client
            .expire_at(id, expires)
            .await
            .map_err(|e| Self::failure(StorageOp::Write, e))?;
        Ok(true)
    }

    async fn destroy(&self, id: &str) -> SessionResult<bool> {
        self.client
            .del(id)
            .await
            .map_err(|e| Self::failure(StorageOp::Destroy, e))?;
        Ok(true)
    }

    async fn gc(&self, _max_lifetime: i64) -> SessionResult<bool> {
        Ok(true)
    }

    async fn validate_id(&self, id: &str) -> SessionResult<bool> {
        if !self.ids.is_well_formed(id) {
            return Ok(false);
        }
        self.client
            .exists(id)
            .await
            .map_err(|e| Self::failure(StorageOp::ValidateId, e))
    }

    async fn create_id(&self) -> SessionResult<String> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = self.ids.generate()?;
            let taken = self
                .client
                .exists(&id)
                .await
                .map_err(|e| Self::failure(StorageOp::CreateId, e))?;
            if !taken {
                return Ok(id);
            }
        }
        Err(Self::failure(
            StorageOp::CreateId,
            "no free id after repeated collisions".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryClient {
        entries: Mutex<HashMap<String, (Vec<u8>, Option<i64>)>>,
        fail: bool,
        // `exists` reports this many collisions before answering honestly.
        collisions: AtomicUsize,
        exists_calls: AtomicUsize,
    }

    impl MemoryClient {
        fn colliding(collisions: usize) -> Self {
            Self {
                collisions: AtomicUsize::new(collisions),
                ..Default::default()
            }
        }
    }

    impl MemoryClient {
        fn check(&self) -> Result<(), BoxError> {
            if self.fail {
                return Err("connection refused".into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KeyValueClient for MemoryClient {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
            self.check()?;
            Ok(self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone()))
        }

        async fn set(&self, key: &str, value: &[u8]) -> Result<(), BoxError> {
            self.check()?;
            self.entries.lock().unwrap().insert(key.to_string(), (value.to_vec(), None));
            Ok(())
        }

        async fn expire_at(&self, key: &str, unix_ts: i64) -> Result<(), BoxError> {
            self.check()?;
            if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
                entry.1 = Some(unix_ts);
            }
            Ok(())
        }

        async fn del(&self, key: &str) -> Result<(), BoxError> {
            self.check()?;
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> Result<bool, BoxError> {
            self.check()?;
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.collisions.load(Ordering::SeqCst);
            if remaining > 0 {
                self.collisions.store(remaining - 1, Ordering::SeqCst);
                return Ok(true);
            }
            Ok(self.entries.lock().unwrap().contains_key(key))
        }
    }

    #[tokio::test]
    async fn test_write_sets_absolute_expiry() {
        let mut store = RedisStore::with_client(MemoryClient::default());
        store.set_lifetime(600);
        let before = Utc::now().timestamp();
        store.write("abc", b"value").await.unwrap();

        let entries = store.client().entries.lock().unwrap();
        let (value, expiry) = entries.get("abc").unwrap();
        assert_eq!(value, b"value");
        let expiry = expiry.unwrap();
        assert!(expiry >= before + 600 && expiry <= before + 602);
    }

    #[tokio::test]
    async fn test_gc_is_noop() {
        let store = RedisStore::with_client(MemoryClient::default());
        store.write("abc", b"value").await.unwrap();
        assert!(store.gc(-1000).await.unwrap());
        assert_eq!(store.read("abc").await.unwrap(), b"value");
    }

    #[tokio::test]
    async fn test_failures_carry_prefix() {
        let store = RedisStore::with_client(MemoryClient {
            fail: true,
            ..Default::default()
        });
        let err = store.read("abc").await.unwrap_err();
        assert_eq!(err.to_string(), "could not read session: connection refused");
        let err = store.write("abc", b"x").await.unwrap_err();
        assert_eq!(err.storage_op(), Some(StorageOp::Write));
        assert!(!store.validate_id("short").await.unwrap());
        assert_eq!(
            store.create_id().await.unwrap_err().storage_op(),
            Some(StorageOp::CreateId)
        );
    }

    #[tokio::test]
    async fn test_create_id_retries_collisions() {
        let store = RedisStore::with_client(MemoryClient::colliding(5));
        let id = store.create_id().await.unwrap();
        assert_eq!(id.len(), 127);
        assert_eq!(store.client().exists_calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_create_id_gives_up_after_bounded_attempts() {
        let store = RedisStore::with_client(MemoryClient::colliding(usize::MAX));
        let err = store.create_id().await.unwrap_err();
        assert_eq!(err.storage_op(), Some(StorageOp::CreateId));
        assert_eq!(
            err.to_string(),
            "could not create sid: no free id after repeated collisions"
        );
        assert_eq!(
            store.client().exists_calls.load(Ordering::SeqCst),
            MAX_CREATE_ATTEMPTS
        );
    }

    #[test]
    fn test_url_validation() {
        assert!(validate_url("redis://localhost:6379").is_ok());
        assert!(validate_url("rediss://cache.internal").is_ok());
        assert!(matches!(
            validate_url("http://localhost"),
            Err(SessionError::InvalidUrl(_))
        ));
    }
}
