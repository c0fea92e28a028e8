//! Soft deadline timer
//!
//! Purely informational: it tells the consumer the task is taking long. It
//! never cancels the dispatcher. The timer task only signals expiry; the
//! runner reports it from its own loop, so a deadline notice is always
//! ordered before the settled update.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::live::LiveUpdate;
use super::ControllerCore;
use crate::events::QuorumEvent;
use crate::state::TaskId;

/// Timer that reports at most once, for a current and unsettled task
pub(crate) struct DeadlineTimer {
    after: Duration,
    expired: Option<oneshot::Receiver<()>>,
    fired: bool,
    handle: JoinHandle<()>,
}

impl DeadlineTimer {
    pub(crate) fn start(after: Duration) -> Self {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(());
        });

        Self {
            after,
            expired: Some(rx),
            fired: false,
            handle,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.expired.is_some()
    }

    /// Completes when the timer task signals expiry. Pending forever once
    /// disarmed.
    pub(crate) async fn expired(&mut self) {
        match self.expired.as_mut() {
            Some(rx) => {
                let _ = rx.await;
                self.expired = None;
            }
            None => std::future::pending().await,
        }
    }

    /// Report the expiry if the task is still current
    pub(crate) fn report(
        &mut self,
        core: &ControllerCore,
        task_id: &TaskId,
        completed: usize,
        k: usize,
    ) {
        if !core.is_current(task_id) {
            debug!(task_id = %task_id, "Soft deadline passed for superseded task");
            return;
        }
        self.fired = true;

        info!(
            task_id = %task_id,
            completed,
            k,
            after_secs = self.after.as_secs(),
            "Soft deadline reached with samples outstanding"
        );
        core.publish(QuorumEvent::DeadlineReached {
            task_id: task_id.clone(),
            completed,
            k,
            timestamp: Utc::now(),
        });
        core.deliver(LiveUpdate::Deadline {
            task_id: task_id.clone(),
            completed,
            k,
        });
    }

    /// Stop the timer; returns whether it had fired
    pub(crate) fn finish(self) -> bool {
        self.handle.abort();
        self.fired
    }
}
