//! History persistence: the store port, its backends and the save gate
//!
//! Persistence is best-effort. Failures are logged and published on the
//! event bus; they never reach the live channel or stop a task.

pub mod gate;
pub mod jsonl;
pub mod store;

pub use gate::{PersistenceGate, SaveFlag};
pub use jsonl::JsonlHistoryStore;
pub use store::{HistoryStore, InMemoryHistoryStore, RecordId, SharedHistoryStore, StoredSnapshot};

#[cfg(test)]
pub use store::MockHistoryStore;

/// Error type for history store operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt history record at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result type for history store operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;
