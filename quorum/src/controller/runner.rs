//! Per-task event loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::deadline::DeadlineTimer;
use super::live::LiveUpdate;
use super::{ControllerCore, TaskOutcome};
use crate::dispatch::{DispatchEvent, InferenceDispatcher};
use crate::events::QuorumEvent;
use crate::persistence::SaveFlag;
use crate::state::{HistorySnapshot, Task};

pub(super) async fn run_task(
    core: Arc<ControllerCore>,
    dispatcher: InferenceDispatcher,
    task: Task,
    soft_deadline: Duration,
    settled: Arc<AtomicBool>,
) -> TaskOutcome {
    let k = task.k;
    let mut results = task.pending_results();
    results.iter_mut().for_each(|s| s.mark_running());

    let flag = SaveFlag::new();
    let mut early_save_attempted = false;
    let mut timer = DeadlineTimer::start(soft_deadline);
    let mut completed = 0;

    let mut events = dispatcher.dispatch(task.image.clone(), k);
    loop {
        let event = tokio::select! {
            biased;
            event = events.recv() => event,
            () = timer.expired(), if timer.is_armed() => {
                timer.report(&core, &task.id, completed, k);
                continue;
            }
        };
        let Some(event) = event else { break };
        match event {
            DispatchEvent::Completed(sample) => {
                completed += 1;
                core.publish(QuorumEvent::SampleCompleted {
                    task_id: task.id.clone(),
                    index: sample.index,
                    succeeded: sample.is_success(),
                    elapsed_ms: sample.elapsed_ms,
                    timestamp: Utc::now(),
                });
                let slot = sample.index - 1;
                results[slot] = sample;

                let verdict = core.engine.classify(&results, k);
                debug!(
                    task_id = %task.id,
                    tag = %verdict.tag,
                    total_seen = verdict.total_seen,
                    success_count = verdict.success_count,
                    "Verdict updated"
                );
                core.publish(QuorumEvent::VerdictUpdated {
                    task_id: task.id.clone(),
                    tag: verdict.tag,
                    success_count: verdict.success_count,
                    total_seen: verdict.total_seen,
                    timestamp: Utc::now(),
                });
                core.deliver(LiveUpdate::Verdict {
                    task_id: task.id.clone(),
                    verdict: verdict.clone(),
                    results: results.clone(),
                });

                if !early_save_attempted && verdict.success_count > 0 {
                    early_save_attempted = true;
                    let snapshot = HistorySnapshot::new(&task, &results, &verdict, false);
                    core.gate.try_save(&flag, snapshot).await;
                }
            }
            DispatchEvent::Settled(all) => {
                results = all;
                break;
            }
        }
    }

    if results.iter().any(|s| !s.is_terminal()) {
        warn!(task_id = %task.id, "Dispatch ended before every sample settled");
    }

    settled.store(true, Ordering::Release);
    let after_deadline = timer.finish();
    let verdict = core.engine.classify(&results, k);
    info!(
        task_id = %task.id,
        tag = %verdict.tag,
        success_count = verdict.success_count,
        k,
        after_deadline,
        "Task settled"
    );
    core.publish(QuorumEvent::TaskSettled {
        task_id: task.id.clone(),
        tag: verdict.tag,
        success_count: verdict.success_count,
        k,
        after_deadline,
        timestamp: Utc::now(),
    });
    core.deliver(LiveUpdate::Settled {
        task_id: task.id.clone(),
        verdict: verdict.clone(),
        results: results.clone(),
        after_deadline,
    });

    let snapshot = HistorySnapshot::new(&task, &results, &verdict, true);
    core.gate.try_save(&flag, snapshot).await;

    TaskOutcome {
        task_id: task.id,
        results,
        verdict,
        saved: flag.is_saved(),
        after_deadline,
    }
}
