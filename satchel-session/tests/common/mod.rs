//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use satchel_session::KeyValueClient;
use satchel_session::error::BoxError;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory stand-in for a Redis connection. Clones share entries.
#[derive(Clone, Default)]
pub struct MemoryClient {
    entries: Arc<Mutex<HashMap<String, (Vec<u8>, Option<i64>)>>>,
}

impl MemoryClient {
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone())
    }

    pub fn expiry(&self, key: &str) -> Option<i64> {
        self.entries.lock().unwrap().get(key).and_then(|(_, e)| *e)
    }
}

#[async_trait]
impl KeyValueClient for MemoryClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), BoxError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_vec(), None));
        Ok(())
    }

    async fn expire_at(&self, key: &str, unix_ts: i64) -> Result<(), BoxError> {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
            entry.1 = Some(unix_ts);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), BoxError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BoxError> {
        Ok(self.entries.lock().unwrap().contains_key(key))
    }
}

/// A single-connection in-memory SQLite pool with the sessions table.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    satchel_session::DatabaseStore::with_pool(pool.clone())
        .create_table()
        .await
        .unwrap();
    pool
}
