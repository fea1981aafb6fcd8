//! Storage drivers.
//!
//! - [`NativeStore`] - the engine's built-in in-process store
//! - [`FileStore`] - one file per session under a save path
//! - [`DatabaseStore`] - a `sessions` table (requires `database`)
//! - [`RedisStore`] - a key-value store with native expiry (requires `redis`)
//! - [`Encrypted`] - wraps any of the above and encrypts payloads at rest

pub mod encrypted;
pub mod file;
pub mod native;

#[cfg(feature = "database")]
pub mod database;

#[cfg(feature = "redis")]
pub mod key_value;

pub use encrypted::Encrypted;
pub use file::FileStore;
pub use native::NativeStore;

#[cfg(feature = "database")]
pub use database::DatabaseStore;

#[cfg(feature = "redis")]
pub use key_value::{KeyValueClient, RedisStore};
