//! History store port and the in-memory backend

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::PersistenceResult;
use crate::state::HistorySnapshot;

/// Store-assigned record id, increasing with every append
pub type RecordId = u64;

/// A snapshot as returned by a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub id: RecordId,
    pub saved_at: DateTime<Utc>,
    pub snapshot: HistorySnapshot,
}

/// History store trait, implemented by all storage backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Whether this store persists data across restarts
    fn is_persistent(&self) -> bool;

    /// Append one snapshot and return its id
    async fn append(&self, snapshot: &HistorySnapshot) -> PersistenceResult<RecordId>;

    /// All stored snapshots, newest first
    async fn list(&self) -> PersistenceResult<Vec<StoredSnapshot>>;

    /// Number of stored snapshots
    async fn len(&self) -> PersistenceResult<usize>;
}

/// Shared reference to a history store
pub type SharedHistoryStore = Arc<dyn HistoryStore>;

/// Non-persistent store, for tests and embedding
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    records: Arc<RwLock<Vec<StoredSnapshot>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedHistoryStore {
        Arc::new(self)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn append(&self, snapshot: &HistorySnapshot) -> PersistenceResult<RecordId> {
        let mut records = self.records.write().await;
        let id = records.len() as RecordId + 1;
        records.push(StoredSnapshot {
            id,
            saved_at: Utc::now(),
            snapshot: snapshot.clone(),
        });
        Ok(id)
    }

    async fn list(&self) -> PersistenceResult<Vec<StoredSnapshot>> {
        let mut records = self.records.read().await.clone();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }

    async fn len(&self) -> PersistenceResult<usize> {
        Ok(self.records.read().await.len())
    }
}
