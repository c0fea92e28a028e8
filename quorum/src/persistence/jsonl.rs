//! Append-only JSONL history store
//!
//! Each line is a complete [`StoredSnapshot`]. Ids follow the line
//! sequence, so a file can be read back without an index.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::store::{HistoryStore, RecordId, StoredSnapshot};
use super::{PersistenceError, PersistenceResult};
use crate::state::HistorySnapshot;

pub struct JsonlHistoryStore {
    path: PathBuf,
    /// Last assigned id; the lock also serializes appends
    last_id: Mutex<RecordId>,
}

impl JsonlHistoryStore {
    /// Open (or lazily create) the store at `path`
    pub async fn open(path: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let path = path.into();
        let existing = read_records(&path).await?;
        let last_id = existing.iter().map(|r| r.id).max().unwrap_or(0);
        debug!(path = %path.display(), records = existing.len(), "Opened history file");
        Ok(Self {
            path,
            last_id: Mutex::new(last_id),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn append(&self, snapshot: &HistorySnapshot) -> PersistenceResult<RecordId> {
        let mut last_id = self.last_id.lock().await;
        let id = *last_id + 1;
        let record = StoredSnapshot {
            id,
            saved_at: Utc::now(),
            snapshot: snapshot.clone(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        *last_id = id;
        info!(path = %self.path.display(), id, "Appended history snapshot");
        Ok(id)
    }

    async fn list(&self) -> PersistenceResult<Vec<StoredSnapshot>> {
        let mut records = read_records(&self.path).await?;
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }

    async fn len(&self) -> PersistenceResult<usize> {
        Ok(read_records(&self.path).await?.len())
    }
}

async fn read_records(path: &Path) -> PersistenceResult<Vec<StoredSnapshot>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: StoredSnapshot =
            serde_json::from_str(line).map_err(|e| PersistenceError::Corrupt {
                line: n + 1,
                reason: e.to_string(),
            })?;
        records.push(record);
    }
    Ok(records)
}
