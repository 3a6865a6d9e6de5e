//! Driven port for the SQL view result cache.
//!
//! Entries hold the canonical table of a completed execution, either keyed
//! by its [`ExecutionFingerprint`] with an expiry, or saved by name without
//! one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::define_port_error;
use crate::domain::canonical_table::CanonicalTable;
use crate::domain::fingerprint::ExecutionFingerprint;
use crate::domain::sql_view_executor::{ExecutionWarning, HeaderDrift};

/// Stored cache record.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// SQL view that produced the table; absent for saved analyses.
    pub sql_view_id: Option<String>,
    /// Fingerprint the entry answers for; absent for saved analyses.
    pub fingerprint: Option<ExecutionFingerprint>,
    /// The cached table, shared with readers.
    pub table: Arc<CanonicalTable>,
    /// Partial-result warning recorded when the table was fetched.
    pub warning: Option<ExecutionWarning>,
    /// Header differences recorded when the table was fetched.
    pub header_drift: Vec<HeaderDrift>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Expiry; `None` for entries that never expire.
    pub expires_at: Option<DateTime<Utc>>,
    /// Display name for saved analyses.
    pub name: Option<String>,
    /// Free-form notes for saved analyses.
    pub user_notes: Option<String>,
}

impl CacheEntry {
    /// Whether the entry is past its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Whether the entry was saved by name rather than by fingerprint.
    pub fn is_saved(&self) -> bool {
        self.fingerprint.is_none()
    }
}

/// Data needed to store an execution result.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCacheEntry {
    /// SQL view that produced the table.
    pub sql_view_id: String,
    /// Fingerprint of the execution.
    pub fingerprint: ExecutionFingerprint,
    /// Table to cache.
    pub table: Arc<CanonicalTable>,
    /// Warning to replay on cache hits.
    pub warning: Option<ExecutionWarning>,
    /// Header drift to replay on cache hits.
    pub header_drift: Vec<HeaderDrift>,
    /// Minutes until expiry.
    pub expiry_minutes: u32,
}

define_port_error! {
    /// Errors raised by cache backends.
    pub enum ResultCacheError {
        /// The backend failed to serve the request.
        Backend {
            /// Backend failure description.
            message: String,
        } => "result cache backend failed: {message}",
    }
}

/// Port for storing and retrieving execution results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultCacheStore: Send + Sync {
    /// Look up a live entry by fingerprint; expired entries are misses.
    async fn get(
        &self,
        fingerprint: &ExecutionFingerprint,
    ) -> Result<Option<CacheEntry>, ResultCacheError>;

    /// Store an execution result, replacing any entry with the same
    /// fingerprint, and return the stored entry.
    async fn put(&self, entry: NewCacheEntry) -> Result<CacheEntry, ResultCacheError>;

    /// Remove one entry. Returns `false` when no entry had that id.
    async fn delete(&self, id: Uuid) -> Result<bool, ResultCacheError>;

    /// All live entries, newest first; expired entries are left out.
    async fn list(&self) -> Result<Vec<CacheEntry>, ResultCacheError>;

    /// Save a table under a name without expiry and return its id.
    async fn save_named(
        &self,
        name: String,
        user_notes: Option<String>,
        table: Arc<CanonicalTable>,
    ) -> Result<Uuid, ResultCacheError>;

    /// Drop every expired entry and return how many were removed.
    async fn purge_expired(&self) -> Result<usize, ResultCacheError>;

    /// Drop every entry.
    async fn clear(&self) -> Result<(), ResultCacheError>;
}

#[cfg(test)]
mod tests {
    //! Expiry classification.

    use super::*;
    use chrono::TimeDelta;

    use crate::domain::sql_view_parameters::SqlViewParameters;
    use std::collections::BTreeMap;

    fn entry(expires_at: Option<DateTime<Utc>>, sql_view_id: Option<&str>) -> CacheEntry {
        CacheEntry {
            id: Uuid::nil(),
            sql_view_id: sql_view_id.map(str::to_owned),
            fingerprint: sql_view_id.map(|id| {
                ExecutionFingerprint::compute(id, &SqlViewParameters::default(), &BTreeMap::new())
            }),
            table: Arc::new(CanonicalTable::default()),
            warning: None,
            header_drift: Vec::new(),
            created_at: DateTime::UNIX_EPOCH,
            expires_at,
            name: None,
            user_notes: None,
        }
    }

    #[test]
    fn entry_expires_at_its_deadline() {
        let deadline = DateTime::UNIX_EPOCH + TimeDelta::minutes(60);
        let cached = entry(Some(deadline), Some("qMYMT0iUGkG"));

        assert!(!cached.is_expired(deadline - TimeDelta::seconds(1)));
        assert!(cached.is_expired(deadline));
        assert!(!cached.is_saved());
    }

    #[test]
    fn saved_entries_never_expire() {
        let saved = entry(None, None);
        assert!(!saved.is_expired(DateTime::<Utc>::MAX_UTC));
        assert!(saved.is_saved());
    }
}
