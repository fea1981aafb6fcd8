//! The session facade.
//!
//! [`SessionContext`] owns everything one session needs: the driver, the
//! options, the engine and the flash data. Sessions start read-only; any
//! mutating call upgrades them to read-write, reopening the session if it
//! was already read.
//!
//! Flash data lives in memory for the current request. [`keep_flash`]
//! persists it under the reserved `flash_data` key; the next start merges it
//! back into memory and removes it from the stored content, so it survives
//! exactly one read.
//!
//! [`keep_flash`]: SessionContext::keep_flash

use crate::engine::{Content, SessionEngine};
use crate::error::{SessionError, SessionResult};
use crate::manager::DriverManager;
use crate::options::{CookieParams, OptionValue, SessionOptions};
use satchel_log::{debug, info, redact};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Content key holding persisted flash data.
pub const FLASH_KEY: &str = "flash_data";

/// One session and its configuration.
///
/// # Examples
///
/// ```
/// use satchel_session::SessionContext;
///
/// # #[tokio::main]
/// # async fn main() -> satchel_session::SessionResult<()> {
/// let mut session = SessionContext::new();
/// session.use_default_driver()?;
///
/// session.set("user_id", 42).await?;
/// assert_eq!(session.get::<i64>("user_id").await?, Some(42));
/// session.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionContext {
    pub(crate) drivers: DriverManager,
    pub(crate) options: SessionOptions,
    engine: SessionEngine,
    flash: Content,
    has_started: bool,
    has_changed: bool,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// A context with the default options and no driver yet.
    pub fn new() -> Self {
        Self::with_options(SessionOptions::new())
    }

    /// A context starting from `options`.
    pub fn with_options(options: SessionOptions) -> Self {
        Self {
            drivers: DriverManager::new(),
            options,
            engine: SessionEngine::new(),
            flash: Content::new(),
            has_started: false,
            has_changed: true,
        }
    }

    /// Start with the current options.
    pub async fn start(&mut self) -> SessionResult<()> {
        self.start_with(std::iter::empty::<(String, OptionValue)>())
            .await
    }

    /// Merge `options` and start.
    pub async fn start_with<K, V, I>(&mut self, options: I) -> SessionResult<()>
    where
        K: Into<String>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        if self.has_started {
            return Err(SessionError::AlreadyStarted);
        }
        self.set_options(options)?;
        self.setup_and_start().await
    }

    async fn setup_and_start(&mut self) -> SessionResult<()> {
        if !self.has_changed {
            return Ok(());
        }
        self.has_changed = false;

        let driver = self.drivers.ensure_configured();
        self.engine.start(driver, &self.options).await?;

        if let Some(Value::Object(saved)) = self.engine.content().get(FLASH_KEY) {
            for (key, value) in saved {
                self.flash.insert(key.clone(), value.clone());
            }
        }

        // The stored flash data has to be cleared, which needs a writable session.
        if !self.has_started && !self.flash.is_empty() && self.is_read_only() {
            debug!("reopening session {} to clear flash data", redact(self.engine.id()));
            self.set_read_write();
            let driver = self.drivers.ensure_configured();
            self.engine.start(driver, &self.options).await?;
        }
        self.engine.content_mut().remove(FLASH_KEY);

        self.has_started = !self.is_read_only();
        Ok(())
    }

    async fn start_if_not_started(&mut self) -> SessionResult<()> {
        if !self.has_started {
            self.setup_and_start().await?;
        }
        Ok(())
    }

    async fn start_if_not_started_force_write(&mut self) -> SessionResult<()> {
        if !self.has_started {
            if self.is_read_only() && !self.engine.id().is_empty() {
                debug!("upgrading session {} to read-write", redact(self.engine.id()));
            }
            self.set_read_write();
            self.setup_and_start().await?;
        }
        Ok(())
    }

    pub(crate) fn mark_changed(&mut self) {
        self.has_changed = true;
    }

    /// Whether a writable session is open.
    pub fn has_started(&self) -> bool {
        self.has_started
    }

    /// Write the content and close. Flash data in memory is dropped.
    pub async fn commit(&mut self) -> SessionResult<()> {
        self.has_started = false;
        self.flash.clear();
        self.has_changed = true;

        let driver = self.drivers.ensure_configured();
        if self.engine.write_close(driver).await? {
            info!("session {} committed", redact(self.engine.id()));
        }
        Ok(())
    }

    /// Drop local changes and re-read the stored content.
    pub async fn rollback(&mut self) -> SessionResult<bool> {
        let driver = self.drivers.ensure_configured();
        self.engine.reset(driver).await
    }

    /// Close without writing.
    pub async fn unsaved(&mut self) -> SessionResult<bool> {
        self.has_started = false;
        self.flash.clear();
        self.has_changed = true;

        let driver = self.drivers.ensure_configured();
        self.engine.abort(driver).await
    }

    /// Delete the stored session. The next start issues a new id.
    pub async fn destroy(&mut self) -> SessionResult<bool> {
        self.has_changed = true;
        self.has_started = false;
        self.engine.unset();

        let driver = self.drivers.ensure_configured();
        let destroyed = self.engine.destroy(driver).await?;
        if destroyed {
            info!("session destroyed");
        }
        Ok(destroyed)
    }

    /// Move the session to a new id and delete the old record.
    pub async fn regenerate(&mut self) -> SessionResult<bool> {
        self.start_if_not_started_force_write().await?;
        let driver = self.drivers.ensure_configured();
        self.engine.regenerate(driver, true).await
    }

    /// Sweep records older than `gc_maxlifetime`.
    pub async fn gc(&mut self) -> SessionResult<bool> {
        self.start_if_not_started_force_write().await?;
        let max_lifetime = self.options.get_int("gc_maxlifetime")?;
        let driver = self.drivers.ensure_configured();
        self.engine.gc(driver, max_lifetime).await
    }

    /// The current session id, empty before the first start.
    pub fn get_id(&self) -> &str {
        self.engine.id()
    }

    /// Use `id` from the next start on.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.has_changed = true;
        self.engine.set_id(id);
    }

    /// Close the session right after reading it on the next start.
    pub fn set_read_only(&mut self) {
        self.has_changed = true;
        self.options.set_read_only(true);
    }

    /// Keep the session open for writing on the next start.
    pub fn set_read_write(&mut self) {
        self.has_changed = true;
        self.options.set_read_only(false);
    }

    /// Whether `read_and_close` is on.
    pub fn is_read_only(&self) -> bool {
        self.options.is_read_only()
    }

    /// Set one option.
    ///
    /// # Arguments
    ///
    /// * `key` - An allowed option name
    /// * `value` - Bool, integer or string value
    pub fn set_option(&mut self, key: &str, value: impl Into<OptionValue>) -> SessionResult<()> {
        self.has_changed = true;
        self.options.set(key, value)
    }

    /// Set several options. Nothing is applied if any key is unknown.
    pub fn set_options<K, V, I>(&mut self, options: I) -> SessionResult<()>
    where
        K: Into<String>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.has_changed = true;
        self.options.merge(options)
    }

    /// The option value, or its default when unset.
    pub fn get_option(&self, key: &str) -> SessionResult<OptionValue> {
        self.options.get(key)
    }

    /// The explicitly configured options.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Cookie parameters derived from the `cookie_*` options.
    pub fn cookie_params(&self) -> SessionResult<CookieParams> {
        self.options.cookie_params()
    }

    /// Store a value, starting the session read-write if needed.
    ///
    /// # Arguments
    ///
    /// * `key` - Content key
    /// * `value` - Any serializable value
    pub async fn set<T: Serialize>(&mut self, key: &str, value: T) -> SessionResult<()> {
        self.start_if_not_started_force_write().await?;
        let value = serde_json::to_value(value)?;
        self.engine.content_mut().insert(key.to_string(), value);
        Ok(())
    }

    /// Whether `key` is present.
    pub async fn has(&mut self, key: &str) -> SessionResult<bool> {
        self.start_if_not_started().await?;
        Ok(self.engine.content().contains_key(key))
    }

    /// Whether `key` holds exactly `value`.
    pub async fn has_key_and_value<T: Serialize>(&mut self, key: &str, value: T) -> SessionResult<bool> {
        self.start_if_not_started().await?;
        let value = serde_json::to_value(value)?;
        Ok(self.engine.content().get(key) == Some(&value))
    }

    /// Read a value, starting the session read-only if needed.
    pub async fn get<T: DeserializeOwned>(&mut self, key: &str) -> SessionResult<Option<T>> {
        self.start_if_not_started().await?;
        self.engine
            .content()
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(SessionError::from)
    }

    /// Delete a key. Starts the session read-write.
    pub async fn remove(&mut self, key: &str) -> SessionResult<()> {
        self.start_if_not_started_force_write().await?;
        self.engine.content_mut().remove(key);
        Ok(())
    }

    /// A copy of the whole content.
    pub async fn get_all(&mut self) -> SessionResult<Content> {
        self.start_if_not_started().await?;
        Ok(self.engine.content().clone())
    }

    /// Read and delete a value in one step.
    pub async fn get_and_remove<T: DeserializeOwned>(&mut self, key: &str) -> SessionResult<Option<T>> {
        self.start_if_not_started_force_write().await?;
        self.engine
            .content_mut()
            .remove(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(SessionError::from)
    }

    /// Set flash data for this request. Call `keep_flash` to carry it over.
    pub fn set_flash<T: Serialize>(&mut self, key: &str, value: T) -> SessionResult<()> {
        let value = serde_json::to_value(value)?;
        self.flash.insert(key.to_string(), value);
        Ok(())
    }

    /// Whether flash data holds `key`.
    pub fn has_flash(&self, key: &str) -> bool {
        self.flash.contains_key(key)
    }

    /// Whether flash `key` holds exactly `value`.
    pub fn has_flash_key_and_value<T: Serialize>(&self, key: &str, value: T) -> SessionResult<bool> {
        let value = serde_json::to_value(value)?;
        Ok(self.flash.get(key) == Some(&value))
    }

    /// Read a flash value.
    pub fn get_flash<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        self.flash
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(SessionError::from)
    }

    /// Drop a flash value from this request.
    pub fn remove_flash(&mut self, key: &str) {
        self.flash.remove(key);
    }

    /// Persist flash data for the next request: the named keys, or all of
    /// it when `keys` is empty.
    pub async fn keep_flash(&mut self, keys: &[&str]) -> SessionResult<()> {
        self.start_if_not_started_force_write().await?;
        let kept: Content = if keys.is_empty() {
            self.flash.clone()
        } else {
            keys.iter()
                .filter_map(|key| self.flash.get(*key).map(|v| (key.to_string(), v.clone())))
                .collect()
        };
        self.engine
            .content_mut()
            .insert(FLASH_KEY.to_string(), Value::Object(kept));
        Ok(())
    }

    /// All flash data of this request.
    pub fn get_all_flash(&self) -> &Content {
        &self.flash
    }
}
