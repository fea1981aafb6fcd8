//! In-process session store.

use crate::error::{SessionError, SessionResult, StorageOp};
use crate::id::{MAX_CREATE_ATTEMPTS, SessionIds};
use crate::traits::{DriverKind, SessionDriver, SessionRecord};
use async_trait::async_trait;
use chrono::Utc;
use satchel_log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The engine's built-in store, used when no driver is configured.
///
/// Records live in process memory and are shared between clones, so a store
/// handed to several contexts behaves like one backend.
#[derive(Debug, Clone, Default)]
pub struct NativeStore {
    records: Arc<RwLock<HashMap<String, SessionRecord>>>,
    ids: SessionIds,
}

impl NativeStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the length of ids issued by `create_id` (at least 32).
    pub fn set_length_session_id(&mut self, length: usize) -> SessionResult<()> {
        self.ids = SessionIds::with_length(length)?;
        Ok(())
    }

    /// Length of ids issued by `create_id`.
    pub fn length_session_id(&self) -> usize {
        self.ids.length()
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether no record is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// A copy of the record for `id`.
    pub async fn record(&self, id: &str) -> Option<SessionRecord> {
        self.records.read().await.get(id).cloned()
    }
}

#[async_trait]
impl SessionDriver for NativeStore {
    fn kind(&self) -> DriverKind {
        DriverKind::Native
    }

    async fn open(&mut self, _save_path: &str, _name: &str) -> SessionResult<bool> {
        Ok(true)
    }

    async fn read(&self, id: &str) -> SessionResult<Vec<u8>> {
        Ok(self
            .records
            .read()
            .await
            .get(id)
            .map(|record| record.content.clone())
            .unwrap_or_default())
    }

    async fn write(&self, id: &str, data: &[u8]) -> SessionResult<bool> {
        let record = SessionRecord::new(id, None, data.to_vec());
        self.records.write().await.insert(id.to_string(), record);
        Ok(true)
    }

    async fn destroy(&self, id: &str) -> SessionResult<bool> {
        self.records.write().await.remove(id);
        Ok(true)
    }

    async fn gc(&self, max_lifetime: i64) -> SessionResult<bool> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(max_lifetime, now));
        debug!("native gc removed {} session(s)", before - records.len());
        Ok(true)
    }

    async fn validate_id(&self, id: &str) -> SessionResult<bool> {
        if !self.ids.is_well_formed(id) {
            return Ok(false);
        }
        Ok(self.records.read().await.contains_key(id))
    }

    async fn create_id(&self) -> SessionResult<String> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = self.ids.generate()?;
            if !self.records.read().await.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(SessionError::storage(
            StorageOp::CreateId,
            "no free id after repeated collisions",
        ))
    }
}
