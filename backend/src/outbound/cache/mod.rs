//! In-process result cache adapter.
//!
//! This module implements the `ResultCacheStore` port with a mutex-guarded
//! list of entries. Expiry is lazy: an expired entry is removed when a
//! lookup touches it or when a caller asks for an explicit purge. There is
//! no background sweep.
//!
//! Each instance is an independent cache scope; construct one per session
//! and drop it to tear the scope down.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::TimeDelta;
use mockable::Clock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{CanonicalTable, ExecutionFingerprint};
use crate::domain::ports::{CacheEntry, NewCacheEntry, ResultCacheError, ResultCacheStore};

/// Memory-backed implementation of [`ResultCacheStore`].
///
/// Entries are kept in insertion order so listing newest-first stays stable
/// even when two entries share a timestamp.
pub struct InMemoryResultCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<CacheEntry>>,
}

impl InMemoryResultCache {
    /// Create an empty cache reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<CacheEntry>>, ResultCacheError> {
        self.entries
            .lock()
            .map_err(|_| ResultCacheError::backend("result cache state poisoned"))
    }
}

#[async_trait]
impl ResultCacheStore for InMemoryResultCache {
    async fn get(
        &self,
        fingerprint: &ExecutionFingerprint,
    ) -> Result<Option<CacheEntry>, ResultCacheError> {
        let now = self.clock.utc();
        let mut entries = self.lock()?;
        let Some(position) = entries
            .iter()
            .position(|entry| entry.fingerprint.as_ref() == Some(fingerprint))
        else {
            return Ok(None);
        };

        match entries.get(position) {
            Some(entry) if entry.is_expired(now) => {
                let expired = entries.remove(position);
                debug!(entry_id = %expired.id, "dropped expired cache entry");
                Ok(None)
            }
            entry => Ok(entry.cloned()),
        }
    }

    async fn put(&self, entry: NewCacheEntry) -> Result<CacheEntry, ResultCacheError> {
        let now = self.clock.utc();
        let NewCacheEntry {
            sql_view_id,
            fingerprint,
            table,
            warning,
            header_drift,
            expiry_minutes,
        } = entry;
        let stored = CacheEntry {
            id: Uuid::new_v4(),
            sql_view_id: Some(sql_view_id),
            fingerprint: Some(fingerprint),
            table,
            warning,
            header_drift,
            created_at: now,
            expires_at: Some(now + TimeDelta::minutes(i64::from(expiry_minutes))),
            name: None,
            user_notes: None,
        };

        let mut entries = self.lock()?;
        entries.retain(|existing| existing.fingerprint != stored.fingerprint);
        entries.push(stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ResultCacheError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        Ok(entries.len() != before)
    }

    async fn list(&self) -> Result<Vec<CacheEntry>, ResultCacheError> {
        let now = self.clock.utc();
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| !entry.is_expired(now))
            .cloned()
            .collect())
    }

    async fn save_named(
        &self,
        name: String,
        user_notes: Option<String>,
        table: Arc<CanonicalTable>,
    ) -> Result<Uuid, ResultCacheError> {
        let id = Uuid::new_v4();
        let saved = CacheEntry {
            id,
            sql_view_id: None,
            fingerprint: None,
            table,
            warning: None,
            header_drift: Vec::new(),
            created_at: self.clock.utc(),
            expires_at: None,
            name: Some(name),
            user_notes,
        };
        self.lock()?.push(saved);
        Ok(id)
    }

    async fn purge_expired(&self) -> Result<usize, ResultCacheError> {
        let now = self.clock.utc();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    async fn clear(&self) -> Result<(), ResultCacheError> {
        self.lock()?.clear();
        Ok(())
    }
}
