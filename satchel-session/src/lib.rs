//! Pluggable session persistence for Satchel.
//!
//! A [`SessionContext`] drives one session through its lifecycle on top of a
//! storage driver. Every driver answers the same [`SessionDriver`] contract,
//! and any of them can be wrapped in [`Encrypted`] so payloads are sealed
//! before they reach the backend.
//!
//! # Drivers
//!
//! - [`NativeStore`] - in-process store, used when nothing else is configured
//! - [`FileStore`] - one file per session under the `save_path` option
//! - [`DatabaseStore`] - a SQLite `sessions` table (`database` feature)
//! - [`RedisStore`] - Redis with native key expiry (`redis` feature)
//!
//! # Lifecycle
//!
//! Sessions start read-only: the record is read once and released. Calls
//! that change the content (`set`, `remove`, `get_and_remove`, `regenerate`,
//! `gc`, `keep_flash`) reopen the session read-write first. `commit` writes
//! and closes, `unsaved` closes without writing, `rollback` re-reads, and
//! `destroy` deletes the record.
//!
//! # Features
//!
//! - `redis` - Redis session storage (enabled by default)
//! - `database` - SQLite session storage (enabled by default)
//! - `full` - everything
//!
//! # Examples
//!
//! ## File sessions
//!
//! ```no_run
//! use satchel_session::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let mut session = SessionContext::new();
//!     session.set_option("save_path", "/var/lib/myapp/sessions")?;
//!     session.use_file_driver()?;
//!
//!     session.set("user_id", 123).await?;
//!     session.set_flash("notice", "Profile saved")?;
//!     session.keep_flash(&[]).await?;
//!     session.commit().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Encrypted Redis sessions
//!
//! ```no_run
//! use satchel_session::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let mut session = SessionContext::new();
//!     session
//!         .use_new_redis_encryption_driver("redis://localhost:6379", "a secret key", Some("aes-256-ctr"))
//!         .await?;
//!
//!     let user_id: Option<i64> = session.get("user_id").await?;
//!     println!("User ID: {:?}", user_id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## From the environment
//!
//! ```no_run
//! use satchel_session::*;
//!
//! # async fn example() -> Result<(), SessionError> {
//! let config = SessionConfig::from_env()?;
//! let mut session = SessionContext::new();
//! session.use_config(&config).await?;
//! session.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod id;
pub mod manager;
pub mod options;
pub mod session;
pub mod store;
pub mod traits;

pub use config::{SessionBackend, SessionConfig};
pub use crypto::{CipherPolicy, Encryption};
pub use engine::{Content, SessionEngine, SessionStatus};
pub use error::{SessionError, SessionResult, StorageOp};
pub use id::SessionIds;
pub use manager::DriverManager;
pub use options::{CookieParams, OptionValue, SessionOptions};
pub use session::{FLASH_KEY, SessionContext};
pub use store::{Encrypted, FileStore, NativeStore};
pub use traits::{DriverKind, PrefixedStore, SessionDriver, SessionRecord, UserScopedStore};

#[cfg(feature = "database")]
pub use store::DatabaseStore;

#[cfg(feature = "redis")]
pub use store::{KeyValueClient, RedisStore};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{SessionBackend, SessionConfig};
    pub use crate::crypto::Encryption;
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::session::SessionContext;
    pub use crate::store::{Encrypted, FileStore, NativeStore};
    pub use crate::traits::{SessionDriver, UserScopedStore, PrefixedStore};

    #[cfg(feature = "database")]
    pub use crate::store::DatabaseStore;

    #[cfg(feature = "redis")]
    pub use crate::store::{KeyValueClient, RedisStore};
}
