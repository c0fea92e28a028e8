//! At-most-once snapshot persistence per task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::store::SharedHistoryStore;
use crate::events::{QuorumEvent, SharedEventBus};
use crate::state::HistorySnapshot;

/// Per-task "already saved" flag
#[derive(Debug, Clone, Default)]
pub struct SaveFlag(Arc<AtomicBool>);

impl SaveFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_saved(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Writes a task's snapshot to the history store at most once.
///
/// A failed write releases the claim so a later attempt for the same task
/// (normally the one at settlement) can retry.
pub struct PersistenceGate {
    store: SharedHistoryStore,
    bus: Option<SharedEventBus>,
}

impl PersistenceGate {
    pub fn new(store: SharedHistoryStore) -> Self {
        Self { store, bus: None }
    }

    /// Publish save outcomes on the event bus
    pub fn with_events(store: SharedHistoryStore, bus: SharedEventBus) -> Self {
        Self {
            store,
            bus: Some(bus),
        }
    }

    pub fn store(&self) -> &SharedHistoryStore {
        &self.store
    }

    /// Returns true only for the call that actually stored the snapshot
    pub async fn try_save(&self, flag: &SaveFlag, snapshot: HistorySnapshot) -> bool {
        let task_id = snapshot.task_id.clone();
        if !flag.claim() {
            debug!(task_id = %task_id, "Snapshot already stored, skipping");
            return false;
        }

        match self.store.append(&snapshot).await {
            Ok(record_id) => {
                info!(
                    task_id = %task_id,
                    record_id,
                    complete = snapshot.complete,
                    tag = %snapshot.verdict.tag,
                    "History snapshot stored"
                );
                self.publish(QuorumEvent::SnapshotSaved {
                    task_id,
                    record_id,
                    complete: snapshot.complete,
                    timestamp: Utc::now(),
                });
                true
            }
            Err(e) => {
                flag.release();
                warn!(task_id = %task_id, error = %e, "Failed to store history snapshot");
                self.publish(QuorumEvent::PersistenceFailed {
                    task_id,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                false
            }
        }
    }

    fn publish(&self, event: QuorumEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }
}
