//! Live updates delivered to the user-facing consumer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::consensus::ConsensusVerdict;
use crate::state::{SampleResult, TaskId};

/// One update on the live channel. Only the current task produces these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveUpdate {
    /// A sample completed and the verdict was recomputed
    Verdict {
        task_id: TaskId,
        verdict: ConsensusVerdict,
        results: Vec<SampleResult>,
    },

    /// The soft deadline passed with samples still outstanding
    Deadline {
        task_id: TaskId,
        completed: usize,
        k: usize,
    },

    /// Every sample settled; the last update for this task
    Settled {
        task_id: TaskId,
        verdict: ConsensusVerdict,
        results: Vec<SampleResult>,
        /// The soft deadline fired before settlement
        after_deadline: bool,
    },
}

impl LiveUpdate {
    pub fn task_id(&self) -> &TaskId {
        match self {
            LiveUpdate::Verdict { task_id, .. }
            | LiveUpdate::Deadline { task_id, .. }
            | LiveUpdate::Settled { task_id, .. } => task_id,
        }
    }

    pub fn verdict(&self) -> Option<&ConsensusVerdict> {
        match self {
            LiveUpdate::Verdict { verdict, .. } | LiveUpdate::Settled { verdict, .. } => {
                Some(verdict)
            }
            LiveUpdate::Deadline { .. } => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, LiveUpdate::Settled { .. })
    }
}

/// Receiving end of the live channel.
///
/// The feed is bounded and tasks never wait for room: updates that arrive
/// while it is full are dropped. Updates still queued for a task that has
/// since been superseded are skipped on receive.
pub struct LiveFeed {
    rx: mpsc::Receiver<LiveUpdate>,
    generation: Arc<AtomicU64>,
}

impl LiveFeed {
    pub(crate) fn channel(
        capacity: usize,
        generation: Arc<AtomicU64>,
    ) -> (mpsc::Sender<LiveUpdate>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx, generation })
    }

    fn is_stale(&self, update: &LiveUpdate) -> bool {
        let stale = update.task_id().generation() != self.generation.load(Ordering::Acquire);
        if stale {
            debug!(task_id = %update.task_id(), "Skipping queued update of superseded task");
        }
        stale
    }

    /// Next update of the current task, or `None` once the controller is gone
    pub async fn recv(&mut self) -> Option<LiveUpdate> {
        loop {
            let update = self.rx.recv().await?;
            if !self.is_stale(&update) {
                return Some(update);
            }
        }
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<LiveUpdate> {
        loop {
            let update = self.rx.try_recv().ok()?;
            if !self.is_stale(&update) {
                return Some(update);
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = LiveUpdate> {
        futures::stream::unfold(self, |mut feed| async move {
            feed.recv().await.map(|update| (update, feed))
        })
    }
}
