//! Background scheduling loop.
//!
//! One long-lived Tokio task wakes on a fixed tick (or immediately when
//! [`Shared::wake`] is notified), settles cancelled and timed-out tasks, and
//! hands every task that needs network work to a short-lived worker. A task
//! with a worker in flight is skipped until the worker returns, so a single
//! task's transitions never run concurrently.

use std::sync::Arc;

use hunyuan3d_client::{JobSpec, RemoteJobClient, RemoteStatus};
use hunyuan3d_core::task::{TaskError, TaskOutcome, TaskState};
use hunyuan3d_core::types::TaskId;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ManagerConfig;
use crate::converter::AssetConverter;
use crate::pipeline;
use crate::registry::{Action, Registry};

/// State shared by the manager, the loop, and its workers.
pub(crate) struct Shared {
    pub registry: Registry,
    pub client: Arc<dyn RemoteJobClient>,
    pub converter: Arc<dyn AssetConverter>,
    pub config: ManagerConfig,
    /// Wakes the loop ahead of its next tick.
    pub wake: Notify,
    /// Master cancellation token, cancelled during shutdown.
    pub stop: CancellationToken,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Submit,
    Poll,
}

impl Step {
    fn as_str(self) -> &'static str {
        match self {
            Step::Submit => "submit",
            Step::Poll => "poll",
        }
    }
}

/// Run the loop until the stop token is triggered.
pub(crate) async fn run(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(
        tick_ms = shared.config.tick_interval.as_millis() as u64,
        "Task scheduler started",
    );

    loop {
        tokio::select! {
            biased;
            _ = shared.stop.cancelled() => break,
            _ = shared.wake.notified() => {}
            _ = ticker.tick() => {}
        }
        tick(&shared);
    }

    // Final pass: nothing will drive idle tasks any more.
    let idle = shared.registry.idle_unfinished();
    for id in &idle {
        shared.registry.settle(*id, TaskOutcome::Cancelled);
    }
    tracing::info!(cancelled = idle.len(), "Task scheduler stopped");
}

/// One scheduling cycle.
fn tick(shared: &Arc<Shared>) {
    let now = Instant::now();

    let evicted = shared.registry.evict_expired(now, shared.config.retention);
    if evicted > 0 {
        tracing::debug!(evicted, "Evicted finished tasks");
    }

    for action in shared.registry.plan(now) {
        match action {
            Action::Settle(id, outcome) => {
                shared.registry.settle(id, outcome);
            }
            Action::Submit(id) => spawn_step(shared, id, Step::Submit),
            Action::Poll(id) => spawn_step(shared, id, Step::Poll),
        }
    }
}

/// Run one step on a worker, supervised so that a crash is contained to the
/// task that caused it.
fn spawn_step(shared: &Arc<Shared>, id: TaskId, step: Step) {
    let worker = {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            match step {
                Step::Submit => submit_step(&shared, id).await,
                Step::Poll => poll_step(&shared, id).await,
            }
        })
    };

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        if let Err(e) = worker.await {
            let reason = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            tracing::error!(task_id = %id, step = step.as_str(), error = %reason, "Task worker crashed");
            shared.registry.settle(
                id,
                TaskOutcome::Failed {
                    error: TaskError::Internal(format!("{} step crashed: {reason}", step.as_str())),
                },
            );
        }
        shared.registry.finish_step(id);

        // After shutdown there is no loop left to observe the flag.
        if shared.stop.is_cancelled() {
            if let Some(outcome) = shared.registry.safe_point(id) {
                shared.registry.settle(id, outcome);
            }
        } else {
            shared.wake.notify_one();
        }
    });
}

/// `Queued -> Submitted -> Polling`, or `Failed` on submission error.
async fn submit_step(shared: &Shared, id: TaskId) {
    let Some(record) = shared.registry.snapshot(id) else {
        return;
    };
    let params = &record.params;

    let job = match JobSpec::from_image_file(&params.image_path, params.options.clone()).await {
        Ok(job) => job,
        Err(e) => {
            let reason = format!("Cannot read image {}: {e}", params.image_path.display());
            shared.registry.settle(id, failed(TaskError::Submission(reason)));
            return;
        }
    };

    if let Some(outcome) = shared.registry.safe_point(id) {
        shared.registry.settle(id, outcome);
        return;
    }

    match shared.client.submit(&params.endpoint, &job).await {
        Ok(remote_job_id) => {
            tracing::info!(
                task_id = %id,
                remote_job_id = %remote_job_id,
                endpoint = %params.endpoint,
                "Generation job submitted",
            );
            let next_poll = Instant::now() + params.poll_interval;
            shared.registry.transition(id, TaskState::Submitted, |entry| {
                entry.record.remote_job_id = Some(remote_job_id);
            });
            shared.registry.transition(id, TaskState::Polling, |entry| {
                entry.next_action_at = next_poll;
            });
        }
        Err(e) => {
            shared
                .registry
                .settle(id, failed(TaskError::Submission(e.to_string())));
        }
    }
}

/// One poll; on completion, continue straight into fetch and convert.
async fn poll_step(shared: &Shared, id: TaskId) {
    let Some(record) = shared.registry.snapshot(id) else {
        return;
    };
    let params = &record.params;
    let Some(remote_job_id) = record.remote_job_id.as_deref() else {
        shared.registry.settle(
            id,
            failed(TaskError::Internal("Polling a task without a remote job id".into())),
        );
        return;
    };

    match shared.client.poll(&params.endpoint, remote_job_id).await {
        Ok(RemoteStatus::InProgress { status }) => {
            tracing::debug!(task_id = %id, status = %status, "Remote job in progress");
            let next_poll = Instant::now() + params.poll_interval;
            shared.registry.record_in_progress(id, status, next_poll);
        }
        Ok(RemoteStatus::Error { message }) => {
            shared.registry.settle(id, failed(TaskError::Remote(message)));
        }
        Ok(RemoteStatus::Complete) => {
            // Nothing irreversible has happened yet, so a pending cancel wins.
            if let Some(outcome) = shared.registry.safe_point(id) {
                shared.registry.settle(id, outcome);
                return;
            }
            if !shared.registry.transition(id, TaskState::Fetching, |_| {}) {
                return;
            }
            let outcome = pipeline::fetch_and_convert(shared, id, params, remote_job_id).await;
            shared.registry.settle(id, outcome);
        }
        Err(e) => {
            tracing::warn!(task_id = %id, error = %e, "Poll failed, retrying next interval");
            shared
                .registry
                .reschedule(id, Instant::now() + params.poll_interval);
        }
    }
}

fn failed(error: TaskError) -> TaskOutcome {
    TaskOutcome::Failed { error }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
