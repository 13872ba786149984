//! Callback dispatch.
//!
//! Workers never call into caller code directly. They push
//! [`Notification`]s onto an unbounded channel that a single dispatcher
//! task drains, invoking the registered callbacks in order. A panicking
//! callback is caught and logged; it never reaches the scheduler.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use hunyuan3d_core::task::TaskOutcome;
use hunyuan3d_core::types::TaskId;
use tokio::sync::mpsc;

use crate::record::{CompletionCallback, ProgressCallback};

/// Progress message sent when the service acknowledges the job.
pub const MSG_STARTED: &str = "Generation started";
/// Progress message sent when the asset download begins.
pub const MSG_FETCHING: &str = "Downloading model";
/// Progress message sent when conversion begins.
pub const MSG_CONVERTING: &str = "Converting to scene format";
/// Progress message sent on cancellation.
pub const MSG_CANCELLED: &str = "Cancelled";

/// Format the progress message for a new remote status string.
pub fn status_message(raw: &str) -> String {
    format!("Status: {raw}")
}

/// Format the final progress message for an outcome.
pub fn outcome_message(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Completed { output_path } => {
            format!("Completed: {}", output_path.display())
        }
        TaskOutcome::Failed { error } => format!("Failed: {error}"),
        TaskOutcome::Cancelled => MSG_CANCELLED.to_string(),
    }
}

/// Message consumed by the dispatcher task.
pub(crate) enum Notification {
    /// Attach callbacks to a freshly submitted task.
    Register {
        task_id: TaskId,
        on_progress: Option<ProgressCallback>,
        on_complete: Option<CompletionCallback>,
    },
    Progress {
        task_id: TaskId,
        message: String,
    },
    /// Final notification; the task's callbacks are dropped afterwards.
    Finished {
        task_id: TaskId,
        outcome: TaskOutcome,
    },
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::Register { task_id, .. } => {
                f.debug_struct("Register").field("task_id", task_id).finish()
            }
            Notification::Progress { task_id, message } => f
                .debug_struct("Progress")
                .field("task_id", task_id)
                .field("message", message)
                .finish(),
            Notification::Finished { task_id, outcome } => f
                .debug_struct("Finished")
                .field("task_id", task_id)
                .field("outcome", outcome)
                .finish(),
        }
    }
}

struct Callbacks {
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompletionCallback>,
}

/// Drain `rx` until every sender is dropped.
pub(crate) async fn run_dispatcher(mut rx: mpsc::UnboundedReceiver<Notification>) {
    let mut registered: HashMap<TaskId, Callbacks> = HashMap::new();

    while let Some(notification) = rx.recv().await {
        match notification {
            Notification::Register {
                task_id,
                on_progress,
                on_complete,
            } => {
                if on_progress.is_some() || on_complete.is_some() {
                    registered.insert(
                        task_id,
                        Callbacks {
                            on_progress,
                            on_complete,
                        },
                    );
                }
            }
            Notification::Progress { task_id, message } => {
                if let Some(callbacks) = registered.get(&task_id) {
                    deliver_progress(task_id, callbacks, &message);
                }
            }
            Notification::Finished { task_id, outcome } => {
                let Some(callbacks) = registered.remove(&task_id) else {
                    continue;
                };
                deliver_progress(task_id, &callbacks, &outcome_message(&outcome));
                if let Some(on_complete) = &callbacks.on_complete {
                    let result = catch_unwind(AssertUnwindSafe(|| on_complete(task_id, &outcome)));
                    if result.is_err() {
                        tracing::error!(task_id = %task_id, "Completion callback panicked");
                    }
                }
            }
        }
    }

    tracing::debug!("Callback dispatcher stopped");
}

fn deliver_progress(task_id: TaskId, callbacks: &Callbacks, message: &str) {
    let Some(on_progress) = &callbacks.on_progress else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| on_progress(task_id, message))).is_err() {
        tracing::error!(task_id = %task_id, message, "Progress callback panicked");
    }
}
