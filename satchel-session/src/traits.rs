//! Storage driver contract.

use crate::error::SessionResult;
use crate::id::SessionIds;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A persisted session, as held by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    /// Owning user, when the store tracks one.
    pub owner_id: Option<i64>,
    pub last_access: DateTime<Utc>,
    /// Opaque payload, possibly an encryption envelope.
    pub content: Vec<u8>,
}

impl SessionRecord {
    /// A record stamped with the current time.
    pub fn new(id: impl Into<String>, owner_id: Option<i64>, content: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            owner_id,
            last_access: Utc::now(),
            content,
        }
    }

    /// Whether the record is older than `max_lifetime` seconds at `now`.
    pub fn is_expired_at(&self, max_lifetime: i64, now: DateTime<Utc>) -> bool {
        expired(self.last_access, max_lifetime, now)
    }
}

/// `last_access + max_lifetime < now`, saturating: an unrepresentable
/// deadline counts as expired only for negative lifetimes.
pub(crate) fn expired(last_access: DateTime<Utc>, max_lifetime: i64, now: DateTime<Utc>) -> bool {
    match TimeDelta::try_seconds(max_lifetime).and_then(|ttl| last_access.checked_add_signed(ttl)) {
        Some(deadline) => deadline < now,
        None => max_lifetime < 0,
    }
}

/// Which backend a driver persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// The engine's built-in in-process store.
    Native,
    File,
    Database,
    KeyValue,
    /// Supplied by the application.
    Custom,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriverKind::Native => "native",
            DriverKind::File => "file",
            DriverKind::Database => "database",
            DriverKind::KeyValue => "key-value",
            DriverKind::Custom => "custom",
        })
    }
}

/// A store that can attach an owning user to the records it writes.
pub trait UserScopedStore {
    /// `None` clears the owner on subsequent writes.
    fn set_user_id(&mut self, user_id: Option<i64>);
}

/// A store whose record names carry a configurable prefix.
pub trait PrefixedStore {
    fn set_prefix(&mut self, prefix: &str);
}

/// Storage driver used by the session engine.
///
/// Every backend answers the same calls with the same meaning:
///
/// - `read` of an unknown id yields empty content, never an error
/// - `destroy` succeeds whether or not the record exists
/// - `gc` removes records whose last access is older than the given lifetime
/// - `validate_id` is `false` for malformed ids without touching the backend
///
/// Backend failures surface as [`SessionError::Storage`](crate::SessionError::Storage).
///
/// # Examples
///
/// ```
/// use satchel_session::{NativeStore, SessionDriver};
///
/// # #[tokio::main]
/// # async fn main() -> satchel_session::SessionResult<()> {
/// let mut store = NativeStore::new();
/// store.open("", "SATCHELSESSID").await?;
///
/// let id = store.create_id().await?;
/// store.write(&id, b"payload").await?;
/// assert_eq!(store.read(&id).await?, b"payload");
/// assert!(store.validate_id(&id).await?);
///
/// store.destroy(&id).await?;
/// assert!(store.read(&id).await?.is_empty());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// The backend this driver writes to.
    fn kind(&self) -> DriverKind {
        DriverKind::Custom
    }

    /// Whether payloads are encrypted before they reach the backend.
    fn is_encrypted(&self) -> bool {
        false
    }

    /// Prepare the store. `save_path` and `name` may be empty.
    async fn open(&mut self, save_path: &str, name: &str) -> SessionResult<bool>;

    /// Release the store. Never fails for the built-in drivers.
    async fn close(&self) -> SessionResult<bool> {
        Ok(true)
    }

    /// Stored content for `id`, empty if there is none.
    async fn read(&self, id: &str) -> SessionResult<Vec<u8>>;

    /// Insert or replace the content for `id` and refresh its last access.
    async fn write(&self, id: &str, data: &[u8]) -> SessionResult<bool>;

    /// Delete the record for `id` if present.
    async fn destroy(&self, id: &str) -> SessionResult<bool>;

    /// Delete every record not accessed within `max_lifetime` seconds.
    async fn gc(&self, max_lifetime: i64) -> SessionResult<bool>;

    /// Whether `id` is well formed and names an existing record.
    ///
    /// The default checks the default id format and that the record has
    /// content.
    async fn validate_id(&self, id: &str) -> SessionResult<bool> {
        if !SessionIds::default().is_well_formed(id) {
            return Ok(false);
        }
        Ok(!self.read(id).await?.is_empty())
    }

    /// Refresh the last access of `id`. Written as a plain write unless a
    /// driver can do better.
    async fn update_timestamp(&self, id: &str, data: &[u8]) -> SessionResult<bool> {
        self.write(id, data).await
    }

    /// A new identifier not used by any existing record.
    ///
    /// The default draws an id of the default length without a collision
    /// check.
    async fn create_id(&self) -> SessionResult<String> {
        SessionIds::default().generate()
    }

    /// Present when the driver can attach an owner to records.
    fn as_user_scoped(&mut self) -> Option<&mut dyn UserScopedStore> {
        None
    }

    /// Present when the driver names records with a prefix.
    fn as_prefixed(&mut self) -> Option<&mut dyn PrefixedStore> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_edges() {
        let now = Utc::now();
        let old = now - TimeDelta::seconds(100);

        assert!(expired(old, 10, now));
        assert!(!expired(old, 1000, now));
        assert!(expired(now, -1000, now));
        assert!(!expired(old, i64::MAX, now));
        assert!(expired(now, i64::MIN, now));
    }

    #[test]
    fn test_record_expiry() {
        let record = SessionRecord::new("id", None, b"x".to_vec());
        assert!(!record.is_expired_at(1440, Utc::now()));
        assert!(record.is_expired_at(-1, Utc::now()));
    }

    #[test]
    fn test_driver_kind_display() {
        assert_eq!(DriverKind::KeyValue.to_string(), "key-value");
        assert_eq!(DriverKind::Native.to_string(), "native");
    }
}
