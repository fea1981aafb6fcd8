//! Relational session storage on SQLite.
//!
//! One row per session in a `sessions` table. Timestamps are produced by the
//! database itself (`datetime('now')`), and `gc` computes its cutoff with the
//! database's own date arithmetic.

use crate::error::{SessionError, SessionResult, StorageOp};
use crate::id::{MAX_CREATE_ATTEMPTS, SessionIds};
use crate::traits::{DriverKind, SessionDriver, SessionRecord, UserScopedStore};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use satchel_log::{debug, error};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Schema installed by [`DatabaseStore::create_table`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id VARCHAR(128) NOT NULL PRIMARY KEY,
    owner_id INTEGER NULL,
    last_access DATETIME NOT NULL,
    content TEXT NOT NULL
)
"#;

// Keeps `datetime(last_access, modifier)` inside SQLite's date range.
const MAX_MODIFIER_SECONDS: i64 = 3_000_000_000;

/// Check a database URL scheme.
pub fn validate_url(url: &str) -> SessionResult<()> {
    if !url.starts_with("sqlite:") {
        return Err(SessionError::InvalidUrl(
            "Database URL must start with sqlite:".to_string(),
        ));
    }
    Ok(())
}

/// SQLite-backed session store.
///
/// # Examples
///
/// ```no_run
/// use satchel_session::{DatabaseStore, SessionDriver, UserScopedStore};
///
/// # async fn example() -> satchel_session::SessionResult<()> {
/// let mut store = DatabaseStore::connect("sqlite://sessions.db").await?;
/// store.create_table().await?;
/// store.set_user_id(Some(42));
///
/// let id = store.create_id().await?;
/// store.write(&id, b"payload").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseStore {
    pool: SqlitePool,
    user_id: Option<i64>,
    ids: SessionIds,
}

impl DatabaseStore {
    /// Connect a new pool to `url`.
    pub async fn connect(url: &str) -> SessionResult<Self> {
        validate_url(url)?;
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| fail(StorageOp::Connect, e))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| fail(StorageOp::Connect, e))?;
        debug!("connected database session store");
        Ok(Self::with_pool(pool))
    }

    /// Use an existing pool.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            user_id: None,
            ids: SessionIds::default(),
        }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `sessions` table if it does not exist.
    pub async fn create_table(&self) -> SessionResult<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| fail(StorageOp::Open, e))?;
        Ok(())
    }

    /// Owner written with every record from now on.
    pub fn set_user_id(&mut self, user_id: Option<i64>) {
        self.user_id = user_id;
    }

    /// Owner written with every record.
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
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

    /// The full row for `id`, if any.
    pub async fn record(&self, id: &str) -> SessionResult<Option<SessionRecord>> {
        let row = sqlx::query("SELECT id, owner_id, last_access, content FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| fail(StorageOp::Read, e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let last_access: String = row.try_get("last_access").map_err(|e| fail(StorageOp::Read, e))?;
        let last_access = NaiveDateTime::parse_from_str(&last_access, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| fail(StorageOp::Read, e))?
            .and_utc();

        Ok(Some(SessionRecord {
            id: row.try_get("id").map_err(|e| fail(StorageOp::Read, e))?,
            owner_id: row.try_get("owner_id").map_err(|e| fail(StorageOp::Read, e))?,
            last_access,
            content: row.try_get("content").map_err(|e| fail(StorageOp::Read, e))?,
        }))
    }

    async fn exists(&self, id: &str, op: StorageOp) -> SessionResult<bool> {
        let row = sqlx::query("SELECT COUNT(id) AS count FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| fail(op, e))?;
        let count: i64 = row.try_get("count").map_err(|e| fail(op, e))?;
        Ok(count > 0)
    }
}

fn fail<E>(op: StorageOp, err: E) -> SessionError
where
    E: std::error::Error + Send + Sync + 'static,
{
    error!("database store: {}: {}", op, err);
    SessionError::storage(op, err)
}

impl UserScopedStore for DatabaseStore {
    fn set_user_id(&mut self, user_id: Option<i64>) {
        self.user_id = user_id;
    }
}

#[async_trait]
impl SessionDriver for DatabaseStore {
    fn kind(&self) -> DriverKind {
        DriverKind::Database
    }

    async fn open(&mut self, _save_path: &str, _name: &str) -> SessionResult<bool> {
        Ok(true)
    }

    async fn read(&self, id: &str) -> SessionResult<Vec<u8>> {
        let row = sqlx::query("SELECT content FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| fail(StorageOp::Read, e))?;

        match row {
            Some(row) => row.try_get("content").map_err(|e| fail(StorageOp::Read, e)),
            None => Ok(Vec::new()),
        }
    }

    async fn write(&self, id: &str, data: &[u8]) -> SessionResult<bool> {
        sqlx::query(
            "INSERT OR REPLACE INTO sessions (id, owner_id, last_access, content) \
             VALUES (?, ?, datetime('now'), ?)",
        )
        .bind(id)
        .bind(self.user_id)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| fail(StorageOp::Write, e))?;
        Ok(true)
    }

    async fn destroy(&self, id: &str) -> SessionResult<bool> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| fail(StorageOp::Destroy, e))?;
        Ok(true)
    }

    async fn gc(&self, max_lifetime: i64) -> SessionResult<bool> {
        let seconds = max_lifetime.clamp(-MAX_MODIFIER_SECONDS, MAX_MODIFIER_SECONDS);
        let result = sqlx::query("DELETE FROM sessions WHERE datetime(last_access, ?) < datetime('now')")
            .bind(format!("{:+} seconds", seconds))
            .execute(&self.pool)
            .await
            .map_err(|e| fail(StorageOp::Gc, e))?;
        debug!("database gc removed {} session(s)", result.rows_affected());
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
        Err(SessionError::storage(
            StorageOp::CreateId,
            "no free id after repeated collisions",
        ))
    }

    fn as_user_scoped(&mut self) -> Option<&mut dyn UserScopedStore> {
        Some(self)
    }
}
