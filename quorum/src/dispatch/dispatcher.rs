//! Inference dispatcher - JoinSet fan-out with per-call isolation
//!
//! ```text
//! dispatch(image, k)
//!   JoinSet::spawn(run_sample(i)) for i in 1..=k      all at once
//!     tokio::spawn(port.infer(image))                 detached call
//!     timeout(per_call, call finished)                local race
//!   Completed(sample) per join, in completion order
//!   Settled(all k, index order)
//! ```
//!
//! A timeout does not abort the provider call. The call keeps running in its
//! own task and writes into the sample slot when it finishes; the slot only
//! accepts the first terminal write, so a late answer cannot revive a sample
//! that was already marked failed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::state::{Answer, ImagePayload, SampleResult};

use super::{InferenceError, SharedInferencePort};

/// Default per-call timeout
pub const DEFAULT_PER_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Progress reported by a dispatch run
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// One sample reached a terminal state
    Completed(SampleResult),
    /// Every sample settled; carries all k results in index order
    Settled(Vec<SampleResult>),
}

/// Fires k independent inference calls for the same image
#[derive(Clone)]
pub struct InferenceDispatcher {
    port: SharedInferencePort,
    per_call_timeout: Duration,
}

impl InferenceDispatcher {
    pub fn new(port: SharedInferencePort, per_call_timeout: Duration) -> Self {
        Self {
            port,
            per_call_timeout,
        }
    }

    pub fn per_call_timeout(&self) -> Duration {
        self.per_call_timeout
    }

    /// Start k calls and return the event stream.
    ///
    /// The channel holds every event the run can produce (k completions and
    /// one settle), so a slow consumer never holds back a sample.
    pub fn dispatch(&self, image: ImagePayload, k: usize) -> mpsc::Receiver<DispatchEvent> {
        let (tx, rx) = mpsc::channel(k + 1);
        let port = Arc::clone(&self.port);
        let per_call_timeout = self.per_call_timeout;

        info!(
            k,
            timeout_ms = per_call_timeout.as_millis() as u64,
            "Dispatching inference samples"
        );

        tokio::spawn(drive(port, image, k, per_call_timeout, tx));
        rx
    }
}

async fn drive(
    port: SharedInferencePort,
    image: ImagePayload,
    k: usize,
    per_call_timeout: Duration,
    tx: mpsc::Sender<DispatchEvent>,
) {
    let mut board: Vec<SampleResult> = (1..=k).map(SampleResult::pending).collect();
    let mut join_set: JoinSet<SampleResult> = JoinSet::new();

    for sample in board.iter_mut() {
        sample.mark_running();
        let slot = Arc::new(SampleSlot::new(sample.clone()));
        join_set.spawn(run_sample(
            Arc::clone(&port),
            image.clone(),
            slot,
            per_call_timeout,
        ));
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(sample) => {
                debug!(
                    index = sample.index,
                    state = ?sample.state,
                    elapsed_ms = sample.elapsed_ms,
                    "Sample settled"
                );
                let slot = sample.index - 1;
                board[slot] = sample.clone();
                if tx.send(DispatchEvent::Completed(sample)).await.is_err() {
                    debug!("Dispatch receiver dropped, finishing run silently");
                }
            }
            Err(e) => {
                // Only reachable if the sample runner itself panicked
                warn!(error = %e, "Sample runner panicked");
            }
        }
    }

    // A panicked runner leaves its sample running; settle it so the board is complete
    for sample in board.iter_mut().filter(|s| !s.is_terminal()) {
        sample.fail(
            InferenceError::Aborted("sample runner panicked".to_string()).to_string(),
            0,
        );
        let _ = tx.send(DispatchEvent::Completed(sample.clone())).await;
    }

    let succeeded = board.iter().filter(|s| s.is_success()).count();
    info!(k, succeeded, "All inference samples settled");
    let _ = tx.send(DispatchEvent::Settled(board)).await;
}

async fn run_sample(
    port: SharedInferencePort,
    image: ImagePayload,
    slot: Arc<SampleSlot>,
    per_call_timeout: Duration,
) -> SampleResult {
    let index = slot.index();
    let started = Instant::now();
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let call_slot = Arc::clone(&slot);
    tokio::spawn(async move {
        let outcome = port.infer(&image).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if !call_slot.settle(outcome, elapsed_ms) {
            debug!(index, elapsed_ms, "Late inference result discarded");
        }
        let _ = done_tx.send(());
    });

    match tokio::time::timeout(per_call_timeout, done_rx).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            warn!(index, "Inference call ended without a result");
            slot.settle(
                Err(InferenceError::Aborted(
                    "inference task panicked".to_string(),
                )),
                elapsed_ms,
            );
        }
        Err(_) => {
            let after_ms = per_call_timeout.as_millis() as u64;
            warn!(index, after_ms, "Inference call timed out");
            slot.settle(Err(InferenceError::Timeout { after_ms }), after_ms);
        }
    }

    slot.snapshot()
}

/// A sample that accepts exactly one terminal write
struct SampleSlot {
    inner: Mutex<SampleResult>,
}

impl SampleSlot {
    fn new(sample: SampleResult) -> Self {
        Self {
            inner: Mutex::new(sample),
        }
    }

    fn index(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .index
    }

    /// Returns false when the sample had already settled
    fn settle(&self, outcome: Result<Answer, InferenceError>, elapsed_ms: u64) -> bool {
        let mut sample = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(answer) => sample.succeed(answer, elapsed_ms),
            Err(e) => {
                if sample.is_terminal() {
                    return false;
                }
                debug!(index = sample.index, error = %e, "Sample failed");
                sample.fail(e.to_string(), elapsed_ms)
            }
        }
    }

    fn snapshot(&self) -> SampleResult {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
