//! Controller integration tests with a scripted inference port.
//!
//! Tests verify:
//! - A superseded task stops reaching the live feed but still persists once
//! - The soft deadline is reported once and flagged on the settled update
//! - A superseded task never reports its deadline
//! - Per-call timeouts fail only their sample
//! - Store failures are published and retried at settlement
//! - Snapshots land in a JSONL history file
//! - An undrained live feed never holds up settlement or persistence
//! - Updates queued before a resubmission are not received afterwards
//! - A filtered bus subscription follows a superseded task to settlement

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quorum::consensus::VerdictTag;
use quorum::persistence::{
    HistoryStore, InMemoryHistoryStore, JsonlHistoryStore, PersistenceError, PersistenceResult,
    RecordId, StoredSnapshot,
};
use quorum::state::{Answer, HistorySnapshot, ImagePayload, SampleState};
use quorum::events::EventFilter;
use quorum::{
    InferenceError, InferencePort, LiveFeed, LiveUpdate, QuorumConfig, QuorumEvent,
    TaskController,
};

/// Per-image queue of (delay, outcome) steps, consumed in call order
#[derive(Default)]
struct ScriptedPort {
    scripts: Mutex<HashMap<String, VecDeque<(u64, Result<&'static str, &'static str>)>>>,
}

impl ScriptedPort {
    fn script(self, image: &str, steps: &[(u64, Result<&'static str, &'static str>)]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(image.to_string(), steps.iter().cloned().collect());
        self
    }
}

#[async_trait]
impl InferencePort for ScriptedPort {
    async fn infer(&self, image: &ImagePayload) -> Result<Answer, InferenceError> {
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(image.data())
            .and_then(|steps| steps.pop_front());
        let (delay_ms, outcome) = step.expect("unscripted inference call");
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        outcome
            .map(|text| Answer::structured("what is shown?", text))
            .map_err(|e| InferenceError::Provider(e.to_string()))
    }
}

/// Fails the first `failures` appends, then behaves like the in-memory store
struct FlakyStore {
    inner: InMemoryHistoryStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryHistoryStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl HistoryStore for FlakyStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn append(&self, snapshot: &HistorySnapshot) -> PersistenceResult<RecordId> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(PersistenceError::Backend("database is locked".to_string()));
        }
        self.inner.append(snapshot).await
    }

    async fn list(&self) -> PersistenceResult<Vec<StoredSnapshot>> {
        self.inner.list().await
    }

    async fn len(&self) -> PersistenceResult<usize> {
        self.inner.len().await
    }
}

fn setup(
    config: QuorumConfig,
    port: ScriptedPort,
    store: Arc<dyn HistoryStore>,
) -> (TaskController, LiveFeed) {
    TaskController::new(config, Arc::new(port), store).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("quorum=debug")
        .with_test_writer()
        .try_init();
}

/// Drain the feed until the settled update of the current task
async fn until_settled(feed: &mut LiveFeed) -> Vec<LiveUpdate> {
    let mut updates = Vec::new();
    while let Some(update) = feed.recv().await {
        let done = update.is_settled();
        updates.push(update);
        if done {
            return updates;
        }
    }
    panic!("live feed closed before settlement");
}

#[tokio::test(start_paused = true)]
async fn superseded_task_is_silent_but_persists_once() {
    init_tracing();
    let port = ScriptedPort::default()
        .script("first", &[(1_000, Ok("H2O")), (1_000, Ok("H2O")), (1_500, Ok("H2O"))])
        .script("second", &[(2_000, Ok("42")), (2_000, Ok("42")), (2_000, Ok("42"))]);
    let store = Arc::new(InMemoryHistoryStore::new());
    let (controller, mut feed) = setup(QuorumConfig::default(), port, store.clone());
    let mut events = controller.events().subscribe();

    let first = controller.submit(ImagePayload::jpeg("first")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = controller.submit(ImagePayload::jpeg("second")).unwrap();
    assert!(!controller.is_current(first.id()));

    let updates = until_settled(&mut feed).await;
    assert!(updates.iter().all(|u| u.task_id() == second.id()));
    assert_eq!(updates.len(), 4);

    let first_outcome = first.wait().await.unwrap();
    let second_outcome = second.wait().await.unwrap();
    assert_eq!(first_outcome.verdict.tag, VerdictTag::AllConsistent);
    assert!(first_outcome.saved);
    assert!(second_outcome.saved);

    let stored = store.list().await.unwrap();
    let first_snapshots = stored
        .iter()
        .filter(|s| s.snapshot.task_id == first_outcome.task_id)
        .count();
    assert_eq!(first_snapshots, 1);
    assert_eq!(stored.len(), 2);

    let mut superseded = 0;
    while let Ok(event) = events.try_recv() {
        if let QuorumEvent::TaskSuperseded { task_id, .. } = event {
            assert_eq!(task_id, first_outcome.task_id);
            superseded += 1;
        }
    }
    assert_eq!(superseded, 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_reported_once_then_settles_late() {
    init_tracing();
    let port = ScriptedPort::default().script(
        "slow",
        &[(1_000, Ok("H2O")), (2_000, Ok("H2O")), (20_000, Ok("H2O"))],
    );
    let store = Arc::new(InMemoryHistoryStore::new());
    let (controller, mut feed) = setup(QuorumConfig::default(), port, store);

    let handle = controller.submit(ImagePayload::jpeg("slow")).unwrap();
    let updates = until_settled(&mut feed).await;

    let kinds: Vec<&str> = updates
        .iter()
        .map(|u| match u {
            LiveUpdate::Verdict { .. } => "verdict",
            LiveUpdate::Deadline { .. } => "deadline",
            LiveUpdate::Settled { .. } => "settled",
        })
        .collect();
    assert_eq!(kinds, vec!["verdict", "verdict", "deadline", "verdict", "settled"]);

    match &updates[2] {
        LiveUpdate::Deadline { completed, k, .. } => {
            assert_eq!(*completed, 2);
            assert_eq!(*k, 3);
        }
        other => panic!("expected deadline, got {:?}", other),
    }
    match updates.last() {
        Some(LiveUpdate::Settled {
            verdict,
            after_deadline,
            ..
        }) => {
            assert!(*after_deadline);
            assert_eq!(verdict.tag, VerdictTag::AllConsistent);
        }
        other => panic!("expected settled, got {:?}", other),
    }

    let outcome = handle.wait().await.unwrap();
    assert!(outcome.after_deadline);
}

#[tokio::test(start_paused = true)]
async fn superseded_task_never_reports_deadline() {
    let port = ScriptedPort::default()
        .script(
            "stale",
            &[(20_000, Ok("A")), (20_000, Ok("A")), (20_000, Ok("A"))],
        )
        .script("fresh", &[(500, Ok("B")), (500, Ok("B")), (500, Ok("B"))]);
    let store = Arc::new(InMemoryHistoryStore::new());
    let (controller, mut feed) = setup(QuorumConfig::default(), port, store);

    let stale = controller.submit(ImagePayload::jpeg("stale")).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let fresh = controller.submit(ImagePayload::jpeg("fresh")).unwrap();

    until_settled(&mut feed).await;
    fresh.wait().await.unwrap();

    let stale_outcome = stale.wait().await.unwrap();
    assert!(!stale_outcome.after_deadline);
    assert!(feed.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn timed_out_sample_fails_alone() {
    let port = ScriptedPort::default().script(
        "img",
        &[(200, Ok("Paris")), (5_000, Ok("Paris")), (300, Ok("Paris"))],
    );
    let config = QuorumConfig {
        per_call_timeout_ms: 1_000,
        ..QuorumConfig::default()
    };
    let store = Arc::new(InMemoryHistoryStore::new());
    let (controller, mut feed) = setup(config, port, store);

    let handle = controller.submit(ImagePayload::jpeg("img")).unwrap();
    let updates = until_settled(&mut feed).await;
    assert_eq!(updates.len(), 4);
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.results.len(), 3);
    let failed: Vec<_> = outcome
        .results
        .iter()
        .filter(|s| s.state == SampleState::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().unwrap().contains("timed out"));
    assert_eq!(outcome.verdict.tag, VerdictTag::TwoConsistent);

    // The late answer resolves after settlement and produces nothing
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(feed.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn store_failure_is_published_and_retried_at_settlement() {
    init_tracing();
    let port = ScriptedPort::default().script(
        "img",
        &[(100, Ok("42")), (200, Ok("42")), (300, Ok("42"))],
    );
    let store = Arc::new(FlakyStore::new(1));
    let (controller, mut feed) = setup(QuorumConfig::default(), port, store.clone());
    let mut events = controller.events().subscribe();

    let handle = controller.submit(ImagePayload::jpeg("img")).unwrap();
    let updates = until_settled(&mut feed).await;
    assert_eq!(updates.len(), 4);

    let outcome = handle.wait().await.unwrap();
    assert!(outcome.saved);

    let stored = store.list().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].snapshot.complete);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type());
    }
    let failed_at = seen.iter().position(|t| *t == "persistence_failed").unwrap();
    let saved_at = seen.iter().position(|t| *t == "snapshot_saved").unwrap();
    assert!(failed_at < saved_at);
}

#[tokio::test(start_paused = true)]
async fn persistently_failing_store_does_not_block_the_task() {
    let port = ScriptedPort::default().script(
        "img",
        &[(100, Ok("42")), (100, Err("HTTP 500")), (100, Ok("41"))],
    );
    let store = Arc::new(FlakyStore::new(usize::MAX));
    let (controller, mut feed) = setup(QuorumConfig::default(), port, store);

    let handle = controller.submit(ImagePayload::jpeg("img")).unwrap();
    let updates = until_settled(&mut feed).await;
    assert!(updates.last().unwrap().is_settled());

    let outcome = handle.wait().await.unwrap();
    assert!(!outcome.saved);
    assert_eq!(outcome.verdict.failed_count, 1);
}

#[tokio::test]
async fn snapshots_written_to_jsonl_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let store = Arc::new(JsonlHistoryStore::open(&path).await.unwrap());

    let port = ScriptedPort::default()
        .script("a", &[(5, Ok("H2O")), (5, Ok("H2O")), (5, Ok("H2O"))])
        .script("b", &[(5, Err("HTTP 503")), (5, Err("HTTP 503")), (5, Err("HTTP 503"))]);
    let (controller, _feed) = setup(QuorumConfig::default(), port, store.clone());

    let first = controller.submit(ImagePayload::jpeg("a")).unwrap().wait().await.unwrap();
    let second = controller.submit(ImagePayload::jpeg("b")).unwrap().wait().await.unwrap();
    assert!(first.saved && second.saved);

    let reopened = JsonlHistoryStore::open(&path).await.unwrap();
    let listed = reopened.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].snapshot.task_id, second.task_id);
    assert_eq!(listed[0].snapshot.verdict.tag, VerdictTag::AllFailed);
    assert_eq!(listed[1].snapshot.results.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn undrained_feed_does_not_block_settlement() {
    init_tracing();
    let port = ScriptedPort::default().script(
        "broken",
        &[(100, Err("HTTP 500")), (200, Err("HTTP 500")), (300, Err("HTTP 500"))],
    );
    let config = QuorumConfig {
        live_capacity: 1,
        ..QuorumConfig::default()
    };
    let store = Arc::new(InMemoryHistoryStore::new());
    let (controller, mut feed) = setup(config, port, store.clone());

    let handle = controller.submit(ImagePayload::jpeg("broken")).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(120), handle.wait())
        .await
        .expect("task settles while the feed is full")
        .unwrap();

    assert_eq!(outcome.verdict.tag, VerdictTag::AllFailed);
    assert!(outcome.saved);
    let stored = store.list().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].snapshot.complete);

    // Only the first update fit; the rest were dropped
    assert!(matches!(feed.try_recv(), Some(LiveUpdate::Verdict { .. })));
    assert!(feed.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn queued_updates_of_previous_task_are_skipped() {
    let port = ScriptedPort::default()
        .script("first", &[(100, Ok("H2O")), (100, Ok("H2O")), (100, Ok("H2O"))])
        .script("second", &[(200, Ok("42")), (200, Ok("42")), (200, Ok("42"))]);
    let store = Arc::new(InMemoryHistoryStore::new());
    let (controller, mut feed) = setup(QuorumConfig::default(), port, store);

    let first = controller.submit(ImagePayload::jpeg("first")).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = controller.submit(ImagePayload::jpeg("second")).unwrap();

    let update = feed.recv().await.unwrap();
    assert_eq!(update.task_id(), second.id());

    let rest = until_settled(&mut feed).await;
    assert!(rest.iter().all(|u| u.task_id() == second.id()));
    assert!(first.wait().await.unwrap().saved);
}

#[tokio::test(start_paused = true)]
async fn filtered_subscription_follows_superseded_task() {
    let port = ScriptedPort::default()
        .script("first", &[(1_000, Ok("H2O")), (1_000, Ok("H2O")), (1_500, Ok("H2O"))])
        .script("second", &[(2_000, Ok("42")), (2_000, Ok("42")), (2_000, Ok("42"))]);
    let store = Arc::new(InMemoryHistoryStore::new());
    let (controller, _feed) = setup(QuorumConfig::default(), port, store);

    let first = controller.submit(ImagePayload::jpeg("first")).unwrap();
    let mut lifecycle = controller.events().subscribe_filtered(
        EventFilter::new()
            .task(first.id())
            .types(vec!["task_superseded", "snapshot_saved", "task_settled"]),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = controller.submit(ImagePayload::jpeg("second")).unwrap();

    match lifecycle.recv().await.unwrap() {
        QuorumEvent::TaskSuperseded { superseded_by, .. } => {
            assert_eq!(&superseded_by, second.id());
        }
        other => panic!("expected task_superseded, got {:?}", other),
    }
    match lifecycle.recv().await.unwrap() {
        QuorumEvent::SnapshotSaved { complete, .. } => assert!(!complete),
        other => panic!("expected snapshot_saved, got {:?}", other),
    }
    match lifecycle.recv().await.unwrap() {
        QuorumEvent::TaskSettled {
            tag, after_deadline, ..
        } => {
            assert_eq!(tag, VerdictTag::AllConsistent);
            assert!(!after_deadline);
        }
        other => panic!("expected task_settled, got {:?}", other),
    }

    let outcome = first.wait().await.unwrap();
    assert!(outcome.saved);
    second.wait().await.unwrap();
}
