//! Lifecycle events emitted while a task runs
//!
//! Unlike live updates these are published for every task, current or not,
//! so observers can see superseded work wind down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consensus::VerdictTag;
use crate::persistence::RecordId;
use crate::state::TaskId;

/// All task lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuorumEvent {
    /// A task was accepted and its samples dispatched
    TaskCreated {
        task_id: TaskId,
        k: usize,
        timestamp: DateTime<Utc>,
    },

    /// One sample reached a terminal state
    SampleCompleted {
        task_id: TaskId,
        index: usize,
        succeeded: bool,
        elapsed_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    /// The verdict was recomputed
    VerdictUpdated {
        task_id: TaskId,
        tag: VerdictTag,
        success_count: usize,
        total_seen: usize,
        timestamp: DateTime<Utc>,
    },

    /// The soft deadline fired while samples were outstanding
    DeadlineReached {
        task_id: TaskId,
        completed: usize,
        k: usize,
        timestamp: DateTime<Utc>,
    },

    /// All samples settled
    TaskSettled {
        task_id: TaskId,
        tag: VerdictTag,
        success_count: usize,
        k: usize,
        after_deadline: bool,
        timestamp: DateTime<Utc>,
    },

    /// A history snapshot was written
    SnapshotSaved {
        task_id: TaskId,
        record_id: RecordId,
        complete: bool,
        timestamp: DateTime<Utc>,
    },

    /// The history store rejected a snapshot
    PersistenceFailed {
        task_id: TaskId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A newer submission replaced this task
    TaskSuperseded {
        task_id: TaskId,
        superseded_by: TaskId,
        timestamp: DateTime<Utc>,
    },
}

impl QuorumEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            QuorumEvent::TaskCreated { timestamp, .. } => *timestamp,
            QuorumEvent::SampleCompleted { timestamp, .. } => *timestamp,
            QuorumEvent::VerdictUpdated { timestamp, .. } => *timestamp,
            QuorumEvent::DeadlineReached { timestamp, .. } => *timestamp,
            QuorumEvent::TaskSettled { timestamp, .. } => *timestamp,
            QuorumEvent::SnapshotSaved { timestamp, .. } => *timestamp,
            QuorumEvent::PersistenceFailed { timestamp, .. } => *timestamp,
            QuorumEvent::TaskSuperseded { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            QuorumEvent::TaskCreated { .. } => "task_created",
            QuorumEvent::SampleCompleted { .. } => "sample_completed",
            QuorumEvent::VerdictUpdated { .. } => "verdict_updated",
            QuorumEvent::DeadlineReached { .. } => "deadline_reached",
            QuorumEvent::TaskSettled { .. } => "task_settled",
            QuorumEvent::SnapshotSaved { .. } => "snapshot_saved",
            QuorumEvent::PersistenceFailed { .. } => "persistence_failed",
            QuorumEvent::TaskSuperseded { .. } => "task_superseded",
        }
    }

    /// Every event is scoped to one task
    pub fn task_id(&self) -> &TaskId {
        match self {
            QuorumEvent::TaskCreated { task_id, .. }
            | QuorumEvent::SampleCompleted { task_id, .. }
            | QuorumEvent::VerdictUpdated { task_id, .. }
            | QuorumEvent::DeadlineReached { task_id, .. }
            | QuorumEvent::TaskSettled { task_id, .. }
            | QuorumEvent::SnapshotSaved { task_id, .. }
            | QuorumEvent::PersistenceFailed { task_id, .. }
            | QuorumEvent::TaskSuperseded { task_id, .. } => task_id,
        }
    }
}
