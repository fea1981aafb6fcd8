//! Driver selection.
//!
//! A context holds at most one driver. It can be replaced freely until the
//! session starts; afterwards every `use_*` call fails with
//! [`SessionError::AlreadyStarted`].

use crate::error::{SessionError, SessionResult};
use crate::session::SessionContext;
use crate::store::{Encrypted, FileStore, NativeStore};
use crate::traits::SessionDriver;
use satchel_log::info;
use std::fmt;

#[cfg(feature = "database")]
use crate::store::DatabaseStore;
#[cfg(feature = "database")]
use sqlx::SqlitePool;

#[cfg(feature = "redis")]
use crate::store::{KeyValueClient, RedisStore};

/// Holds the driver of one session context.
#[derive(Default)]
pub struct DriverManager {
    driver: Option<Box<dyn SessionDriver>>,
}

impl fmt::Debug for DriverManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverManager")
            .field("kind", &self.driver.as_ref().map(|d| d.kind()))
            .field("encrypted", &self.driver.as_ref().map(|d| d.is_encrypted()))
            .finish()
    }
}

impl DriverManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.driver.is_some()
    }

    /// Replace the driver.
    pub fn set(&mut self, driver: Box<dyn SessionDriver>) {
        info!(
            "using {}{} session driver",
            driver.kind(),
            if driver.is_encrypted() { " (encrypted)" } else { "" }
        );
        self.driver = Some(driver);
    }

    /// The configured driver, if any.
    pub fn driver(&self) -> Option<&dyn SessionDriver> {
        self.driver.as_deref()
    }

    /// The configured driver, falling back to [`NativeStore`].
    pub fn ensure_configured(&mut self) -> &mut dyn SessionDriver {
        self.driver
            .get_or_insert_with(|| Box::new(NativeStore::new()))
            .as_mut()
    }

    /// Attach an owner if the driver supports it.
    pub fn set_user_id(&mut self, user_id: Option<i64>) -> bool {
        match self.driver.as_mut().and_then(|d| d.as_user_scoped()) {
            Some(store) => {
                store.set_user_id(user_id);
                true
            }
            None => false,
        }
    }

    /// Change the record prefix if the driver supports it.
    pub fn set_prefix(&mut self, prefix: &str) -> bool {
        match self.driver.as_mut().and_then(|d| d.as_prefixed()) {
            Some(store) => {
                store.set_prefix(prefix);
                true
            }
            None => false,
        }
    }
}

pub(crate) fn encrypted<S: SessionDriver>(
    inner: S,
    key: &str,
    method: Option<&str>,
) -> SessionResult<Encrypted<S>> {
    let mut store = Encrypted::new(inner, key);
    if let Some(method) = method {
        store.set_method(method)?;
    }
    Ok(store)
}

impl SessionContext {
    pub(crate) fn install<S: SessionDriver + 'static>(&mut self, driver: S) -> SessionResult<()> {
        self.ensure_not_started()?;
        self.drivers.set(Box::new(driver));
        self.mark_changed();
        Ok(())
    }

    pub(crate) fn ensure_not_started(&self) -> SessionResult<()> {
        if self.has_started() {
            return Err(SessionError::AlreadyStarted);
        }
        Ok(())
    }

    /// The built-in in-process store.
    pub fn use_default_driver(&mut self) -> SessionResult<()> {
        self.install(NativeStore::new())
    }

    /// The in-process store, encrypted.
    ///
    /// # Arguments
    ///
    /// * `key` - Encryption key
    /// * `method` - Cipher name, `aes-256-cbc` when `None`
    pub fn use_default_encryption_driver(&mut self, key: &str, method: Option<&str>) -> SessionResult<()> {
        self.ensure_not_started()?;
        self.install(encrypted(NativeStore::new(), key, method)?)
    }

    /// Files under the `save_path` option.
    pub fn use_file_driver(&mut self) -> SessionResult<()> {
        self.install(FileStore::new())
    }

    /// Files under the `save_path` option, encrypted.
    pub fn use_file_encryption_driver(&mut self, key: &str, method: Option<&str>) -> SessionResult<()> {
        self.ensure_not_started()?;
        self.install(encrypted(FileStore::new(), key, method)?)
    }

    #[cfg(feature = "database")]
    pub async fn use_new_database_driver(&mut self, url: &str) -> SessionResult<()> {
        self.ensure_not_started()?;
        let store = DatabaseStore::connect(url).await?;
        self.install(store)
    }

    #[cfg(feature = "database")]
    pub fn use_current_database_driver(&mut self, pool: SqlitePool) -> SessionResult<()> {
        self.install(DatabaseStore::with_pool(pool))
    }

    #[cfg(feature = "database")]
    pub async fn use_new_database_encryption_driver(
        &mut self,
        url: &str,
        key: &str,
        method: Option<&str>,
    ) -> SessionResult<()> {
        self.ensure_not_started()?;
        let store = DatabaseStore::connect(url).await?;
        self.install(encrypted(store, key, method)?)
    }

    #[cfg(feature = "database")]
    pub fn use_current_database_encryption_driver(
        &mut self,
        pool: SqlitePool,
        key: &str,
        method: Option<&str>,
    ) -> SessionResult<()> {
        self.ensure_not_started()?;
        self.install(encrypted(DatabaseStore::with_pool(pool), key, method)?)
    }

    #[cfg(feature = "redis")]
    pub async fn use_new_redis_driver(&mut self, url: &str) -> SessionResult<()> {
        self.ensure_not_started()?;
        let mut store = RedisStore::connect(url).await?;
        store.set_lifetime(self.options.key_value_lifetime()?);
        self.install(store)
    }

    #[cfg(feature = "redis")]
    pub fn use_current_redis_driver<C: KeyValueClient + 'static>(&mut self, client: C) -> SessionResult<()> {
        self.ensure_not_started()?;
        let mut store = RedisStore::with_client(client);
        store.set_lifetime(self.options.key_value_lifetime()?);
        self.install(store)
    }

    #[cfg(feature = "redis")]
    pub async fn use_new_redis_encryption_driver(
        &mut self,
        url: &str,
        key: &str,
        method: Option<&str>,
    ) -> SessionResult<()> {
        self.ensure_not_started()?;
        let mut store = RedisStore::connect(url).await?;
        store.set_lifetime(self.options.key_value_lifetime()?);
        self.install(encrypted(store, key, method)?)
    }

    #[cfg(feature = "redis")]
    pub fn use_current_redis_encryption_driver<C: KeyValueClient + 'static>(
        &mut self,
        client: C,
        key: &str,
        method: Option<&str>,
    ) -> SessionResult<()> {
        self.ensure_not_started()?;
        let mut store = RedisStore::with_client(client);
        store.set_lifetime(self.options.key_value_lifetime()?);
        self.install(encrypted(store, key, method)?)
    }

    /// Any application-supplied driver.
    pub fn use_custom_driver<D: SessionDriver + 'static>(&mut self, driver: D) -> SessionResult<()> {
        self.install(driver)
    }

    /// The configured driver, if any.
    pub fn driver(&self) -> Option<&dyn SessionDriver> {
        self.drivers.driver()
    }

    /// Returns false when the driver does not track owners.
    pub fn set_user_id_for_database(&mut self, user_id: Option<i64>) -> bool {
        self.drivers.set_user_id(user_id)
    }

    /// Returns false when the driver has no record prefix.
    pub fn set_prefix_for_file(&mut self, prefix: &str) -> bool {
        self.drivers.set_prefix(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DriverKind;

    #[test]
    fn test_defaults_to_native() {
        let mut manager = DriverManager::new();
        assert!(!manager.is_configured());
        assert_eq!(manager.ensure_configured().kind(), DriverKind::Native);
        assert!(manager.is_configured());
    }

    #[test]
    fn test_capability_hooks() {
        let mut manager = DriverManager::new();
        assert!(!manager.set_prefix("p_"));

        manager.set(Box::new(FileStore::new()));
        assert!(manager.set_prefix("p_"));
        assert!(!manager.set_user_id(Some(1)));

        manager.set(Box::new(Encrypted::new(FileStore::new(), "k")));
        assert!(manager.set_prefix("p_"));
    }

    #[test]
    fn test_encrypted_with_bad_method() {
        let err = encrypted(NativeStore::new(), "k", Some("rc4")).unwrap_err();
        assert_eq!(err.to_string(), "Unknown method: rc4");
    }
}
