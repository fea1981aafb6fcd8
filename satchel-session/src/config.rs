//! Driver configuration.

use crate::error::{SessionError, SessionResult};
use crate::manager::encrypted;
use crate::session::SessionContext;
use crate::store::{FileStore, NativeStore};
use crate::traits::SessionDriver;
use std::env;
use std::str::FromStr;

#[cfg(feature = "database")]
use crate::store::DatabaseStore;
#[cfg(feature = "redis")]
use crate::store::RedisStore;

/// Session storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    /// In-process store
    Native,
    /// One file per session
    File,
    /// SQLite `sessions` table
    Database,
    /// Redis
    Redis,
}

impl FromStr for SessionBackend {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "native" | "default" => Ok(SessionBackend::Native),
            "file" | "files" => Ok(SessionBackend::File),
            "database" | "sqlite" => Ok(SessionBackend::Database),
            "redis" | "key-value" => Ok(SessionBackend::Redis),
            other => Err(SessionError::Configuration(format!(
                "Unknown session driver: {}",
                other
            ))),
        }
    }
}

/// Describes which driver a [`SessionContext`] should use.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backend type
    pub backend: SessionBackend,
    /// Connection URL (database and Redis backends)
    pub url: String,
    /// Directory for the file backend
    pub save_path: Option<String>,
    /// File name prefix for the file backend
    pub prefix: Option<String>,
    /// Length of generated session ids
    pub id_length: Option<usize>,
    /// Record lifetime in seconds (Redis backend)
    pub lifetime: Option<i64>,
    /// Encrypt payloads with this key
    pub encryption_key: Option<String>,
    /// Cipher name, defaults to aes-256-cbc
    pub encryption_method: Option<String>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("backend", &self.backend)
            .field("url", &self.url)
            .field("save_path", &self.save_path)
            .field("prefix", &self.prefix)
            .field("id_length", &self.id_length)
            .field("lifetime", &self.lifetime)
            .field("encrypted", &self.encryption_key.is_some())
            .field("encryption_method", &self.encryption_method)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Native,
            url: String::new(),
            save_path: None,
            prefix: None,
            id_length: None,
            lifetime: None,
            encryption_key: None,
            encryption_method: None,
        }
    }
}

impl SessionConfig {
    /// The in-process store.
    pub fn native() -> Self {
        Self::default()
    }

    /// Files under `save_path`. An empty path means the system temp dir.
    ///
    /// # Examples
    ///
    /// ```
    /// use satchel_session::SessionConfig;
    ///
    /// let config = SessionConfig::file("/var/lib/myapp/sessions").with_prefix("app_");
    /// ```
    pub fn file(save_path: &str) -> Self {
        Self {
            backend: SessionBackend::File,
            save_path: Some(save_path.to_string()),
            ..Default::default()
        }
    }

    /// A SQLite database (e.g. `"sqlite://sessions.db"` or `"sqlite::memory:"`).
    pub fn database(url: &str) -> SessionResult<Self> {
        if !url.starts_with("sqlite:") {
            return Err(SessionError::InvalidUrl(
                "Database URL must start with sqlite:".to_string(),
            ));
        }

        Ok(Self {
            backend: SessionBackend::Database,
            url: url.to_string(),
            ..Default::default()
        })
    }

    /// A Redis server.
    ///
    /// # Examples
    ///
    /// ```
    /// use satchel_session::SessionConfig;
    ///
    /// let config = SessionConfig::redis("redis://localhost:6379")
    ///     .unwrap()
    ///     .with_lifetime(3600)
    ///     .with_encryption("a secret key");
    /// assert!(SessionConfig::redis("localhost:6379").is_err());
    /// ```
    pub fn redis(url: &str) -> SessionResult<Self> {
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(SessionError::InvalidUrl(
                "Redis URL must start with redis:// or rediss://".to_string(),
            ));
        }

        Ok(Self {
            backend: SessionBackend::Redis,
            url: url.to_string(),
            ..Default::default()
        })
    }

    /// Encrypt payloads at rest with `key`.
    pub fn with_encryption(mut self, key: &str) -> Self {
        self.encryption_key = Some(key.to_string());
        self
    }

    /// Cipher used when encryption is on.
    pub fn with_method(mut self, method: &str) -> Self {
        self.encryption_method = Some(method.to_string());
        self
    }

    /// File name prefix for the file backend.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    /// Length of generated ids, at least 32.
    pub fn with_id_length(mut self, length: usize) -> Self {
        self.id_length = Some(length);
        self
    }

    /// Record lifetime for the Redis backend.
    pub fn with_lifetime(mut self, seconds: i64) -> Self {
        self.lifetime = Some(seconds);
        self
    }

    /// Load from `SESSION_*` environment variables.
    ///
    /// - `SESSION_DRIVER=native|file|database|redis`
    /// - `SESSION_SAVE_PATH`, `SESSION_FILE_PREFIX`
    /// - `SESSION_DATABASE_URL`, `SESSION_REDIS_URL`
    /// - `SESSION_ID_LENGTH`, `SESSION_LIFETIME`
    /// - `SESSION_ENCRYPTION_KEY`, `SESSION_ENCRYPTION_METHOD`
    pub fn from_env() -> SessionResult<Self> {
        let backend: SessionBackend = env::var("SESSION_DRIVER").unwrap_or_default().parse()?;

        let mut config = match backend {
            SessionBackend::Native => Self::native(),
            SessionBackend::File => Self::file(&env::var("SESSION_SAVE_PATH").unwrap_or_default()),
            SessionBackend::Database => Self::database(
                &env::var("SESSION_DATABASE_URL").unwrap_or_else(|_| "sqlite://sessions.db".to_string()),
            )?,
            SessionBackend::Redis => Self::redis(
                &env::var("SESSION_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            )?,
        };

        if let Ok(prefix) = env::var("SESSION_FILE_PREFIX") {
            config = config.with_prefix(&prefix);
        }
        if let Ok(length) = env::var("SESSION_ID_LENGTH") {
            config = config.with_id_length(parse_env("SESSION_ID_LENGTH", &length)?);
        }
        if let Ok(lifetime) = env::var("SESSION_LIFETIME") {
            config = config.with_lifetime(parse_env("SESSION_LIFETIME", &lifetime)?);
        }
        if let Ok(key) = env::var("SESSION_ENCRYPTION_KEY") {
            if !key.is_empty() {
                config = config.with_encryption(&key);
            }
        }
        if let Ok(method) = env::var("SESSION_ENCRYPTION_METHOD") {
            config = config.with_method(&method);
        }

        Ok(config)
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> SessionResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SessionError::Configuration(format!("Invalid {}: {}", name, value)))
}

impl SessionContext {
    /// Install the driver `config` describes.
    ///
    /// The database backend creates its table if missing. The file backend's
    /// save path becomes the `save_path` option.
    pub async fn use_config(&mut self, config: &SessionConfig) -> SessionResult<()> {
        self.ensure_not_started()?;

        match config.backend {
            SessionBackend::Native => {
                let mut store = NativeStore::new();
                if let Some(length) = config.id_length {
                    store.set_length_session_id(length)?;
                }
                self.install_configured(store, config)
            }
            SessionBackend::File => {
                let mut store = FileStore::new();
                if let Some(length) = config.id_length {
                    store.set_length_session_id(length)?;
                }
                if let Some(prefix) = &config.prefix {
                    store = store.with_prefix(prefix);
                }
                if let Some(path) = &config.save_path {
                    self.set_option("save_path", path.as_str())?;
                }
                self.install_configured(store, config)
            }
            #[cfg(feature = "database")]
            SessionBackend::Database => {
                let mut store = DatabaseStore::connect(&config.url).await?;
                store.create_table().await?;
                if let Some(length) = config.id_length {
                    store.set_length_session_id(length)?;
                }
                self.install_configured(store, config)
            }
            #[cfg(feature = "redis")]
            SessionBackend::Redis => {
                let mut store = RedisStore::connect(&config.url).await?;
                if let Some(length) = config.id_length {
                    store.set_length_session_id(length)?;
                }
                let lifetime = match config.lifetime {
                    Some(lifetime) => lifetime,
                    None => self.options.key_value_lifetime()?,
                };
                store.set_lifetime(lifetime);
                self.install_configured(store, config)
            }
            #[allow(unreachable_patterns)]
            backend => Err(SessionError::Configuration(format!(
                "{:?} sessions are not enabled in this build",
                backend
            ))),
        }
    }

    fn install_configured<S: SessionDriver + 'static>(
        &mut self,
        store: S,
        config: &SessionConfig,
    ) -> SessionResult<()> {
        match &config.encryption_key {
            Some(key) => {
                let store = encrypted(store, key, config.encryption_method.as_deref())?;
                self.install(store)
            }
            None => self.install(store),
        }
    }
}
