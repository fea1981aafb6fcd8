//! The session engine: id handling, content decoding and driver dispatch.
//!
//! The engine owns the live content of one session and decides which driver
//! call each lifecycle step turns into. It never holds a driver itself; the
//! caller passes the configured one on every call.

use crate::error::{SessionError, SessionResult};
use crate::id::SessionIds;
use crate::options::{CookieParams, SessionOptions};
use crate::traits::SessionDriver;
use rand::Rng;
use satchel_log::{debug, redact, warn};
use serde_json::{Map, Value};

/// Decoded session content.
pub type Content = Map<String, Value>;

/// Whether the engine holds the session open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Inactive,
    Active,
}

/// Empty bytes are an empty session; anything else must be a JSON object.
pub fn decode(bytes: &[u8]) -> SessionResult<Content> {
    if bytes.is_empty() {
        return Ok(Content::new());
    }
    match serde_json::from_slice(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(SessionError::Serialization(
            "session content is not an object".to_string(),
        )),
    }
}

/// An empty session encodes to empty bytes.
pub fn encode(content: &Content) -> SessionResult<Vec<u8>> {
    if content.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::to_vec(content)?)
}

#[derive(Debug, Default)]
pub struct SessionEngine {
    id: Option<String>,
    // The id came from `create_id`, so strict mode need not re-check it.
    issued: bool,
    name: String,
    save_path: String,
    cookie: Option<CookieParams>,
    lazy_write: bool,
    content: Content,
    raw: Vec<u8>,
    status: SessionStatus,
}

impl SessionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the driver, settle on an id and load its content.
    ///
    /// Does nothing if the session is already active. In read-and-close mode
    /// the driver is closed again right away; the content stays readable.
    pub async fn start(
        &mut self,
        driver: &mut dyn SessionDriver,
        options: &SessionOptions,
    ) -> SessionResult<bool> {
        if self.is_active() {
            return Ok(true);
        }

        self.name = options.get_string("name")?;
        self.save_path = options.get_string("save_path")?;
        self.cookie = Some(options.cookie_params()?);
        self.lazy_write = options.get_bool("lazy_write")?;

        driver.open(&self.save_path, &self.name).await?;

        // `self.id` is only replaced once the new id has been read, so a
        // failed start leaves the requested id in place.
        let strict = options.get_bool("use_strict_mode")?;
        let (id, issued) = match self.id.clone().filter(|id| !id.is_empty()) {
            None => (driver.create_id().await?, true),
            Some(id) if !SessionIds::has_valid_chars(&id) => {
                debug!("rejected malformed session id");
                (driver.create_id().await?, true)
            }
            Some(id) if !self.issued && strict => {
                if driver.validate_id(&id).await? {
                    (id, false)
                } else {
                    debug!("rejected unknown session id {}", redact(&id));
                    (driver.create_id().await?, true)
                }
            }
            Some(id) => (id, self.issued),
        };

        let raw = driver.read(&id).await?;
        self.content = decode(&raw)?;
        self.raw = raw;
        self.id = Some(id);
        self.issued = issued;
        self.status = SessionStatus::Active;
        debug!("session {} started", redact(self.id()));

        self.maybe_gc(driver, options).await?;

        if options.is_read_only() {
            driver.close().await?;
            self.status = SessionStatus::Inactive;
        }
        Ok(true)
    }

    async fn maybe_gc(
        &self,
        driver: &dyn SessionDriver,
        options: &SessionOptions,
    ) -> SessionResult<()> {
        let probability = options.get_int("gc_probability")?;
        let divisor = options.get_int("gc_divisor")?;
        if probability <= 0 || divisor <= 0 {
            return Ok(());
        }
        if rand::rng().random_range(1..=divisor) > probability {
            return Ok(());
        }
        let max_lifetime = options.get_int("gc_maxlifetime")?;
        if let Err(e) = driver.gc(max_lifetime).await {
            warn!("session gc failed: {}", e);
        }
        Ok(())
    }

    /// Persist the content and close. Inactive sessions have nothing to write.
    pub async fn write_close(&mut self, driver: &mut dyn SessionDriver) -> SessionResult<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        let Some(id) = self.id.clone() else {
            return Ok(false);
        };

        let bytes = encode(&self.content)?;
        if self.lazy_write && bytes == self.raw {
            driver.update_timestamp(&id, &bytes).await?;
        } else {
            driver.write(&id, &bytes).await?;
        }
        driver.close().await?;

        self.raw = bytes;
        self.status = SessionStatus::Inactive;
        debug!("session {} written", redact(&id));
        Ok(true)
    }

    /// Close without writing; the content reverts to what was last read.
    pub async fn abort(&mut self, driver: &mut dyn SessionDriver) -> SessionResult<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        driver.close().await?;
        self.content = decode(&self.raw)?;
        self.status = SessionStatus::Inactive;
        Ok(true)
    }

    /// Re-read the content from the driver, dropping local changes.
    pub async fn reset(&mut self, driver: &mut dyn SessionDriver) -> SessionResult<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        let Some(id) = self.id.as_deref() else {
            return Ok(false);
        };
        self.raw = driver.read(id).await?;
        self.content = decode(&self.raw)?;
        Ok(true)
    }

    /// Move the content to a fresh id, optionally deleting the old record.
    pub async fn regenerate(
        &mut self,
        driver: &mut dyn SessionDriver,
        delete_old: bool,
    ) -> SessionResult<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        let new_id = driver.create_id().await?;
        if let Some(old) = self.id.as_deref() {
            if delete_old {
                driver.destroy(old).await?;
            }
            debug!("session {} regenerated as {}", redact(old), redact(&new_id));
        }
        self.id = Some(new_id);
        self.issued = true;
        self.raw.clear();
        Ok(true)
    }

    /// Delete the record and forget the id.
    pub async fn destroy(&mut self, driver: &mut dyn SessionDriver) -> SessionResult<bool> {
        let Some(id) = self.id.take() else {
            return Ok(false);
        };
        driver.destroy(&id).await?;
        if self.is_active() {
            driver.close().await?;
        }
        self.content.clear();
        self.raw.clear();
        self.issued = false;
        self.status = SessionStatus::Inactive;
        debug!("session {} destroyed", redact(&id));
        Ok(true)
    }

    /// Sweep records older than `max_lifetime` seconds.
    pub async fn gc(&self, driver: &dyn SessionDriver, max_lifetime: i64) -> SessionResult<bool> {
        driver.gc(max_lifetime).await
    }

    /// Clear the content without touching the store.
    pub fn unset(&mut self) {
        self.content.clear();
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Mutable content; written back by `write_close`.
    pub fn content_mut(&mut self) -> &mut Content {
        &mut self.content
    }

    /// The current id, empty if none has been settled yet.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Use `id` on the next start.
    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.id = (!id.is_empty()).then_some(id);
        self.issued = false;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn save_path(&self) -> &str {
        &self.save_path
    }

    /// Cookie attributes captured at the last start.
    pub fn cookie_params(&self) -> Option<&CookieParams> {
        self.cookie.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Encrypted, FileStore, NativeStore};
    use serde_json::json;

    fn read_write() -> SessionOptions {
        let mut options = SessionOptions::new();
        options.set_read_only(false);
        options.set("gc_probability", 0).unwrap();
        options
    }

    #[test]
    fn test_codec_edges() {
        assert!(decode(b"").unwrap().is_empty());
        assert!(encode(&Content::new()).unwrap().is_empty());
        assert!(matches!(decode(b"[1,2]"), Err(SessionError::Serialization(_))));
        assert!(matches!(decode(b"{oops"), Err(SessionError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_start_write_and_resume() {
        let mut store = NativeStore::new();
        let options = read_write();

        let mut engine = SessionEngine::new();
        engine.start(&mut store, &options).await.unwrap();
        assert!(engine.is_active());
        assert_eq!(engine.id().len(), 127);
        engine.content_mut().insert("a".into(), json!("b"));
        assert!(engine.write_close(&mut store).await.unwrap());
        assert!(!engine.is_active());

        let mut next = SessionEngine::new();
        next.set_id(engine.id());
        next.start(&mut store, &options).await.unwrap();
        assert_eq!(next.id(), engine.id());
        assert_eq!(next.content().get("a"), Some(&json!("b")));
    }

    #[tokio::test]
    async fn test_strict_mode_replaces_unknown_id() {
        let mut store = NativeStore::new();
        let mut engine = SessionEngine::new();
        engine.set_id("kjlfez/fez");
        engine.start(&mut store, &read_write()).await.unwrap();
        assert_ne!(engine.id(), "kjlfez/fez");

        let mut lax = read_write();
        lax.set("use_strict_mode", false).unwrap();
        let mut engine = SessionEngine::new();
        engine.set_id("client-chosen");
        engine.start(&mut store, &lax).await.unwrap();
        assert_eq!(engine.id(), "client-chosen");
    }

    #[tokio::test]
    async fn test_malformed_id_replaced_without_strict_mode() {
        let root = tempfile::tempdir().unwrap();
        let save_path = root.path().join("sessions");
        let mut store = FileStore::new().with_prefix("");

        let mut options = read_write();
        options.set("use_strict_mode", false).unwrap();
        options
            .set("save_path", save_path.to_str().unwrap())
            .unwrap();

        let mut engine = SessionEngine::new();
        engine.set_id("../escaped");
        engine.start(&mut store, &options).await.unwrap();
        assert_ne!(engine.id(), "../escaped");
        assert!(SessionIds::default().is_well_formed(engine.id()));

        engine.content_mut().insert("a".into(), json!(1));
        engine.write_close(&mut store).await.unwrap();
        assert!(!root.path().join("escaped").exists());
        assert!(save_path.join(engine.id()).exists());
    }

    #[tokio::test]
    async fn test_failed_start_keeps_requested_id() {
        let mut store = Encrypted::new(NativeStore::new(), "");
        let mut options = read_write();
        options.set("use_strict_mode", false).unwrap();

        let mut engine = SessionEngine::new();
        engine.set_id("client-chosen");
        assert!(engine.start(&mut store, &options).await.is_err());
        assert!(!engine.is_active());
        assert_eq!(engine.id(), "client-chosen");

        store.set_key("randomKey");
        engine.start(&mut store, &options).await.unwrap();
        assert_eq!(engine.id(), "client-chosen");
    }

    #[tokio::test]
    async fn test_read_and_close_keeps_content() {
        let mut store = NativeStore::new();
        store.write("known", br#"{"k":1}"#).await.unwrap();

        let mut options = SessionOptions::new();
        options.set("use_strict_mode", false).unwrap();
        let mut engine = SessionEngine::new();
        engine.set_id("known");
        engine.start(&mut store, &options).await.unwrap();
        assert!(!engine.is_active());
        assert_eq!(engine.content().get("k"), Some(&json!(1)));
        assert!(!engine.write_close(&mut store).await.unwrap());
    }

    #[tokio::test]
    async fn test_abort_and_reset_drop_changes() {
        let mut store = NativeStore::new();
        let options = read_write();
        let mut engine = SessionEngine::new();
        engine.start(&mut store, &options).await.unwrap();
        engine.content_mut().insert("x".into(), json!(true));
        assert!(engine.reset(&mut store).await.unwrap());
        assert!(engine.content().is_empty());

        engine.content_mut().insert("x".into(), json!(true));
        assert!(engine.abort(&mut store).await.unwrap());
        assert!(engine.content().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_regenerate_and_destroy() {
        let mut store = NativeStore::new();
        let options = read_write();
        let mut engine = SessionEngine::new();
        engine.start(&mut store, &options).await.unwrap();
        engine.content_mut().insert("x".into(), json!(1));
        engine.write_close(&mut store).await.unwrap();
        let old = engine.id().to_string();

        engine.start(&mut store, &options).await.unwrap();
        assert!(engine.regenerate(&mut store, true).await.unwrap());
        assert_ne!(engine.id(), old);
        assert!(store.read(&old).await.unwrap().is_empty());
        engine.write_close(&mut store).await.unwrap();
        assert!(!store.read(engine.id()).await.unwrap().is_empty());

        assert!(engine.destroy(&mut store).await.unwrap());
        assert_eq!(engine.id(), "");
        assert!(engine.content().is_empty());
        assert!(store.is_empty().await);
        assert!(!engine.destroy(&mut store).await.unwrap());
    }
}
