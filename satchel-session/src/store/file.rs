//! Filesystem session storage.
//!
//! Each session is one file named `<prefix><id>` under the save path.

use crate::error::{SessionError, SessionResult, StorageOp};
use crate::id::{MAX_CREATE_ATTEMPTS, SessionIds};
use crate::traits::{DriverKind, PrefixedStore, SessionDriver, expired};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use satchel_log::{debug, error, warn};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "sess_";

/// File-backed session store.
///
/// # Examples
///
/// ```no_run
/// use satchel_session::{FileStore, SessionDriver};
///
/// # async fn example() -> satchel_session::SessionResult<()> {
/// let mut store = FileStore::new().with_prefix("app_");
/// store.open("/var/lib/myapp/sessions", "SATCHELSESSID").await?;
///
/// let id = store.create_id().await?;
/// store.write(&id, b"payload").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    save_path: PathBuf,
    prefix: String,
    ids: SessionIds,
}

impl Default for FileStore {
    fn default() -> Self {
        Self {
            save_path: std::env::temp_dir(),
            prefix: DEFAULT_PREFIX.to_string(),
            ids: SessionIds::default(),
        }
    }
}

impl FileStore {
    /// A store rooted at the system temp dir until opened.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name files `<prefix><id>` instead of `sess_<id>`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Prefix of every session file name.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Directory holding the session files.
    pub fn save_path(&self) -> &Path {
        &self.save_path
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

    /// Path of the file holding `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.save_path.join(format!("{}{}", self.prefix, id))
    }

    async fn exists(&self, id: &str, op: StorageOp) -> SessionResult<bool> {
        fs::try_exists(self.path_for(id))
            .await
            .map_err(|e| fail(op, e))
    }
}

impl PrefixedStore for FileStore {
    fn set_prefix(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
    }
}

fn fail<E>(op: StorageOp, err: E) -> SessionError
where
    E: std::error::Error + Send + Sync + 'static,
{
    error!("file store: {}: {}", op, err);
    SessionError::storage(op, err)
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

#[async_trait]
impl SessionDriver for FileStore {
    fn kind(&self) -> DriverKind {
        DriverKind::File
    }

    async fn open(&mut self, save_path: &str, _name: &str) -> SessionResult<bool> {
        if !save_path.is_empty() {
            self.save_path = PathBuf::from(save_path);
        }
        if is_dir(&self.save_path).await {
            return Ok(true);
        }

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);

        match builder.create(&self.save_path).await {
            Ok(()) => {
                debug!("created session directory {}", self.save_path.display());
                Ok(true)
            }
            // Another process may have created it in the meantime.
            Err(_) if is_dir(&self.save_path).await => Ok(true),
            Err(e) => Err(fail(
                StorageOp::Open,
                io::Error::new(
                    e.kind(),
                    format!("Directory \"{}\" was not created: {}", self.save_path.display(), e),
                ),
            )),
        }
    }

    async fn read(&self, id: &str) -> SessionResult<Vec<u8>> {
        match fs::read(self.path_for(id)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            // A directory named like the session is not a session.
            Err(_) if is_dir(&self.path_for(id)).await => Ok(Vec::new()),
            Err(e) => Err(fail(StorageOp::Read, e)),
        }
    }

    async fn write(&self, id: &str, data: &[u8]) -> SessionResult<bool> {
        fs::write(self.path_for(id), data)
            .await
            .map_err(|e| fail(StorageOp::Write, e))?;
        Ok(true)
    }

    async fn destroy(&self, id: &str) -> SessionResult<bool> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(fail(StorageOp::Destroy, e)),
        }
    }

    async fn gc(&self, max_lifetime: i64) -> SessionResult<bool> {
        let pattern = format!(
            "{}{}{}*",
            glob::Pattern::escape(&self.save_path.to_string_lossy()),
            std::path::MAIN_SEPARATOR,
            glob::Pattern::escape(&self.prefix)
        );
        let entries = glob::glob(&pattern).map_err(|e| fail(StorageOp::Gc, e))?;

        let now = Utc::now();
        let mut removed = 0usize;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("skipping unreadable session file: {}", e);
                    continue;
                }
            };
            let Ok(meta) = fs::metadata(&path).await else {
                continue;
            };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            if !meta.is_file() || !expired(DateTime::<Utc>::from(modified), max_lifetime, now) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(fail(StorageOp::Gc, e)),
            }
        }

        debug!("file gc removed {} session(s)", removed);
        Ok(true)
    }

    async fn validate_id(&self, id: &str) -> SessionResult<bool> {
        if !self.ids.is_well_formed(id) {
            return Ok(false);
        }
        self.exists(id, StorageOp::ValidateId).await
    }

    async fn create_id(&self) -> SessionResult<String> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = self.ids.generate()?;
            if !self.exists(&id, StorageOp::CreateId).await? {
                return Ok(id);
            }
        }
        Err(fail(
            StorageOp::CreateId,
            io::Error::other("no free id after repeated collisions"),
        ))
    }

    fn as_prefixed(&mut self) -> Option<&mut dyn PrefixedStore> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn opened(dir: &Path) -> FileStore {
        let mut store = FileStore::new();
        store.open(dir.to_str().unwrap(), "SATCHELSESSID").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("sessions");
        let store = opened(&nested).await;
        assert!(nested.is_dir());
        assert_eq!(store.save_path(), nested);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&nested).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0);
        }

        // A second open on an existing directory is fine.
        opened(&nested).await;
    }

    #[tokio::test]
    async fn test_open_fails_when_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();

        let mut store = FileStore::new();
        let err = store.open(file.to_str().unwrap(), "n").await.unwrap_err();
        assert_eq!(err.storage_op(), Some(StorageOp::Open));
        assert!(err.to_string().starts_with("could not open session: Directory"));
    }

    #[tokio::test]
    async fn test_file_layout_uses_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = opened(dir.path()).await;
        store.write("abc", b"data").await.unwrap();
        assert!(dir.path().join("sess_abc").is_file());

        store.set_prefix("custom_");
        store.write("abc", b"data").await.unwrap();
        assert!(dir.path().join("custom_abc").is_file());
        assert_eq!(store.prefix(), "custom_");
    }

    #[tokio::test]
    async fn test_gc_only_touches_prefixed_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = opened(dir.path()).await;
        store.write("one", b"1").await.unwrap();
        std::fs::write(dir.path().join("unrelated"), b"keep").unwrap();
        std::fs::create_dir(dir.path().join("sess_dir")).unwrap();

        store.gc(1440).await.unwrap();
        assert!(dir.path().join("sess_one").exists());

        store.gc(-1000).await.unwrap();
        assert!(!dir.path().join("sess_one").exists());
        assert!(dir.path().join("unrelated").exists());
        assert!(dir.path().join("sess_dir").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_io_failures_carry_operation() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = opened(dir.path()).await;
        std::fs::write(dir.path().join("blocker"), b"x").unwrap();
        store.set_prefix("blocker/");

        let err = store.read("abc").await.unwrap_err();
        assert_eq!(err.storage_op(), Some(StorageOp::Read));
        assert!(err.to_string().starts_with("could not read session: "));
        let err = store.write("abc", b"x").await.unwrap_err();
        assert_eq!(err.storage_op(), Some(StorageOp::Write));
        let err = store.destroy("abc").await.unwrap_err();
        assert_eq!(err.storage_op(), Some(StorageOp::Destroy));
    }

    #[tokio::test]
    async fn test_prefix_with_glob_metacharacters() {
        let dir = tempfile::tempdir().unwrap();
        let store = opened(dir.path()).await.with_prefix("[s]*_");
        store.write("x", b"1").await.unwrap();
        std::fs::write(dir.path().join("s_other"), b"keep").unwrap();

        store.gc(-1000).await.unwrap();
        assert!(!dir.path().join("[s]*_x").exists());
        assert!(dir.path().join("s_other").exists());
    }
}
