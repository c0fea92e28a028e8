//! Task controller - owns the lifecycle of multi-sample tasks
//!
//! ```text
//! submit(image)
//!   generation += 1                  new task becomes current
//!   dispatcher.dispatch(image, k)
//!   deadline timer (display only)
//!   per completion:
//!     classify -> live Verdict       only while current
//!     first success -> try_save      partial snapshot
//!   on settle:
//!     classify -> live Settled       only while current
//!     try_save                       always
//! ```
//!
//! Supersession is decided at the delivery boundary: every task carries its
//! generation and the controller only remembers the current one. A
//! superseded task keeps running, settles and persists; nothing it produces
//! reaches the live feed any more, including updates it queued earlier.
//!
//! Delivery never waits on the consumer. A full or closed feed drops the
//! update; settlement and persistence go ahead regardless.

mod deadline;
pub mod live;
mod runner;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{ConfigError, QuorumConfig};
use crate::consensus::{ConsensusEngine, ConsensusVerdict};
use crate::dispatch::{InferenceDispatcher, SharedInferencePort};
use crate::events::{EventBus, QuorumEvent, SharedEventBus};
use crate::persistence::{PersistenceGate, SharedHistoryStore};
use crate::state::{ImagePayload, SampleResult, Task, TaskId, MAX_SAMPLES, MIN_SAMPLES};

pub use live::{LiveFeed, LiveUpdate};

/// Error type for controller operations
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("no image payload available")]
    NoPayload,

    #[error("sample count must be between 1 and 5, got {0}")]
    InvalidSamples(usize),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("task runner failed: {0}")]
    TaskJoin(String),
}

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Final state of a task, available whether or not it was superseded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    /// All k samples in index order
    pub results: Vec<SampleResult>,
    pub verdict: ConsensusVerdict,
    /// A snapshot of this task is in the history store
    pub saved: bool,
    pub after_deadline: bool,
}

/// Handle to a submitted task
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    join: JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> &TaskId {
        &self.task_id
    }

    /// Wait for the task to settle
    pub async fn wait(self) -> ControllerResult<TaskOutcome> {
        self.join
            .await
            .map_err(|e| ControllerError::TaskJoin(e.to_string()))
    }
}

/// The task currently allowed to reach the live feed
struct CurrentTask {
    id: TaskId,
    settled: Arc<AtomicBool>,
}

/// State shared between the controller and its task runners
pub(crate) struct ControllerCore {
    generation: Arc<AtomicU64>,
    live_tx: mpsc::Sender<LiveUpdate>,
    bus: SharedEventBus,
    gate: PersistenceGate,
    engine: ConsensusEngine,
}

impl ControllerCore {
    pub(crate) fn is_current(&self, task_id: &TaskId) -> bool {
        self.generation.load(Ordering::Acquire) == task_id.generation()
    }

    /// Forward an update to the live feed if its task is still current
    pub(crate) fn deliver(&self, update: LiveUpdate) {
        if !self.is_current(update.task_id()) {
            debug!(task_id = %update.task_id(), "Dropping live update of superseded task");
            return;
        }
        match self.live_tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                debug!(task_id = %update.task_id(), "Live feed full, update dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Live feed closed, update dropped");
            }
        }
    }

    pub(crate) fn publish(&self, event: QuorumEvent) {
        self.bus.publish(event);
    }
}

/// Accepts submissions and runs each as an independent task
pub struct TaskController {
    config: QuorumConfig,
    dispatcher: InferenceDispatcher,
    core: Arc<ControllerCore>,
    current: Mutex<Option<CurrentTask>>,
}

impl TaskController {
    /// Create a controller and the live feed its current task reports to
    pub fn new(
        config: QuorumConfig,
        port: SharedInferencePort,
        store: SharedHistoryStore,
    ) -> ControllerResult<(Self, LiveFeed)> {
        Self::with_event_bus(config, port, store, EventBus::new().shared())
    }

    /// Same as [`TaskController::new`], publishing on an existing bus
    pub fn with_event_bus(
        config: QuorumConfig,
        port: SharedInferencePort,
        store: SharedHistoryStore,
        bus: SharedEventBus,
    ) -> ControllerResult<(Self, LiveFeed)> {
        config.validate()?;

        let generation = Arc::new(AtomicU64::new(0));
        let (live_tx, feed) =
            LiveFeed::channel(config.live_capacity, Arc::clone(&generation));
        let core = Arc::new(ControllerCore {
            generation,
            live_tx,
            gate: PersistenceGate::with_events(store, Arc::clone(&bus)),
            bus,
            engine: config.engine(),
        });
        let dispatcher = InferenceDispatcher::new(port, config.per_call_timeout());

        let controller = Self {
            config,
            dispatcher,
            core,
            current: Mutex::new(None),
        };
        Ok((controller, feed))
    }

    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    pub fn events(&self) -> SharedEventBus {
        Arc::clone(&self.core.bus)
    }

    pub fn store(&self) -> &SharedHistoryStore {
        self.core.gate.store()
    }

    /// Id of the task currently reporting to the live feed
    pub fn current_task(&self) -> Option<TaskId> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.id.clone())
    }

    pub fn is_current(&self, task_id: &TaskId) -> bool {
        self.core.is_current(task_id)
    }

    /// Submit an image with the configured sample count
    pub fn submit(&self, image: ImagePayload) -> ControllerResult<TaskHandle> {
        self.submit_with_samples(image, self.config.samples)
    }

    /// Submit an image with an explicit sample count.
    ///
    /// The new task supersedes whatever task was current. A rejected
    /// submission leaves the current task untouched.
    pub fn submit_with_samples(&self, image: ImagePayload, k: usize) -> ControllerResult<TaskHandle> {
        if image.is_empty() {
            return Err(ControllerError::NoPayload);
        }
        if !(MIN_SAMPLES..=MAX_SAMPLES).contains(&k) {
            return Err(ControllerError::InvalidSamples(k));
        }

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        let generation = self.core.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let task = Task::new(TaskId::new(generation), k, image);
        let task_id = task.id.clone();
        let settled = Arc::new(AtomicBool::new(false));

        if let Some(previous) = current.take() {
            if !previous.settled.load(Ordering::Acquire) {
                info!(task_id = %previous.id, superseded_by = %task_id, "Task superseded");
                self.core.publish(QuorumEvent::TaskSuperseded {
                    task_id: previous.id,
                    superseded_by: task_id.clone(),
                    timestamp: Utc::now(),
                });
            }
        }
        *current = Some(CurrentTask {
            id: task_id.clone(),
            settled: Arc::clone(&settled),
        });
        drop(current);

        info!(task_id = %task_id, k, "Task created");
        self.core.publish(QuorumEvent::TaskCreated {
            task_id: task_id.clone(),
            k,
            timestamp: task.created_at,
        });

        let join = tokio::spawn(runner::run_task(
            Arc::clone(&self.core),
            self.dispatcher.clone(),
            task,
            self.config.soft_deadline_for(k),
            settled,
        ));

        Ok(TaskHandle { task_id, join })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::VerdictTag;
    use crate::dispatch::{InferenceError, InferencePort};
    use crate::persistence::{HistoryStore, InMemoryHistoryStore};
    use crate::state::Answer;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Answers after `delay_ms`; an image whose data starts with "fail" errors
    struct EchoPort {
        delay_ms: u64,
    }

    #[async_trait]
    impl InferencePort for EchoPort {
        async fn infer(&self, image: &ImagePayload) -> Result<Answer, InferenceError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if image.data().starts_with("fail") {
                return Err(InferenceError::Provider("HTTP 500".to_string()));
            }
            Ok(Answer::structured("q", image.data()))
        }
    }

    fn controller(delay_ms: u64) -> (TaskController, LiveFeed, Arc<InMemoryHistoryStore>) {
        let store = Arc::new(InMemoryHistoryStore::new());
        let (controller, feed) = TaskController::new(
            QuorumConfig::default(),
            Arc::new(EchoPort { delay_ms }),
            store.clone(),
        )
        .unwrap();
        (controller, feed, store)
    }

    #[tokio::test]
    async fn test_empty_payload_rejected_without_superseding() {
        let (controller, _feed, _store) = controller(10);
        let first = controller.submit(ImagePayload::jpeg("H2O")).unwrap();

        let err = controller.submit(ImagePayload::jpeg("   ")).unwrap_err();
        assert!(matches!(err, ControllerError::NoPayload));
        assert!(controller.is_current(first.id()));
        assert_eq!(controller.current_task().as_ref(), Some(first.id()));
    }

    #[tokio::test]
    async fn test_sample_count_bounds() {
        let (controller, _feed, _store) = controller(10);
        assert!(matches!(
            controller.submit_with_samples(ImagePayload::jpeg("x"), 0),
            Err(ControllerError::InvalidSamples(0))
        ));
        assert!(matches!(
            controller.submit_with_samples(ImagePayload::jpeg("x"), 6),
            Err(ControllerError::InvalidSamples(6))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = QuorumConfig {
            samples: 7,
            ..QuorumConfig::default()
        };
        let result = TaskController::new(
            config,
            Arc::new(EchoPort { delay_ms: 1 }),
            Arc::new(InMemoryHistoryStore::new()),
        );
        assert!(matches!(result, Err(ControllerError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_task_runs_to_settlement() {
        let (controller, mut feed, store) = controller(100);
        let handle = controller.submit(ImagePayload::jpeg("H2O")).unwrap();
        let task_id = handle.id().clone();

        let mut verdicts = 0;
        loop {
            let update = feed.recv().await.unwrap();
            assert_eq!(update.task_id(), &task_id);
            match update {
                LiveUpdate::Verdict { .. } => verdicts += 1,
                LiveUpdate::Settled {
                    verdict,
                    after_deadline,
                    ..
                } => {
                    assert_eq!(verdict.tag, VerdictTag::AllConsistent);
                    assert!(!after_deadline);
                    break;
                }
                LiveUpdate::Deadline { .. } => panic!("deadline should not fire"),
            }
        }
        assert_eq!(verdicts, 3);

        let outcome = handle.wait().await.unwrap();
        assert!(outcome.saved);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(store.len().await.unwrap(), 1);

        // Stored on the first success, before settlement
        let stored = store.list().await.unwrap();
        assert!(!stored[0].snapshot.complete);
        assert_eq!(stored[0].snapshot.verdict.success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_saves_final_snapshot() {
        let (controller, _feed, store) = controller(10);
        let outcome = controller
            .submit(ImagePayload::jpeg("fail-me"))
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(outcome.verdict.tag, VerdictTag::AllFailed);
        assert!(outcome.verdict.is_aggregate_failure());
        assert!(outcome.saved);

        let stored = store.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].snapshot.complete);
        assert_eq!(stored[0].snapshot.verdict.failed_count, 3);
    }
}
