//! The active task set and its single guarded transition path.
//!
//! Every state change goes through [`Registry::transition`], which checks
//! the move against [`TaskState::can_transition_to`], appends to the
//! record's history, and publishes the matching event and notification
//! while still holding the write lock, so observers see each task's
//! transitions in order. The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use hunyuan3d_core::task::{TaskError, TaskOutcome, TaskState};
use hunyuan3d_core::types::TaskId;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{status_message, Notification, MSG_CONVERTING, MSG_FETCHING, MSG_STARTED};
use crate::events::TaskEvent;
use crate::record::{CompletionCallback, ProgressCallback, TaskRecord, Transition};

// ---------------------------------------------------------------------------
// TaskEntry
// ---------------------------------------------------------------------------

/// Internal bookkeeping for a single task.
pub(crate) struct TaskEntry {
    pub record: TaskRecord,
    /// One-way cancellation flag.
    pub cancel: CancellationToken,
    /// A worker is currently driving this task.
    pub in_flight: bool,
    /// Earliest time the scheduler may poll again.
    pub next_action_at: Instant,
    pub created: Instant,
    pub finished: Option<Instant>,
    /// Per-task scratch directory, present only while it exists on disk.
    pub workdir: Option<TempDir>,
}

impl TaskEntry {
    pub fn new(record: TaskRecord, now: Instant) -> Self {
        Self {
            record,
            cancel: CancellationToken::new(),
            in_flight: false,
            next_action_at: now,
            created: now,
            finished: None,
            workdir: None,
        }
    }

    /// Outcome forced by a pending cancellation or an expired timeout.
    fn interruption(&self, now: Instant) -> Option<TaskOutcome> {
        if self.cancel.is_cancelled() {
            return Some(TaskOutcome::Cancelled);
        }
        let timeout = self.record.params.timeout?;
        let elapsed = now.saturating_duration_since(self.created);
        (elapsed >= timeout).then(|| TaskOutcome::Failed {
            error: TaskError::Timeout {
                elapsed_secs: elapsed.as_secs(),
            },
        })
    }
}

/// Work chosen for one task during a scheduler tick.
#[derive(Debug)]
pub(crate) enum Action {
    Settle(TaskId, TaskOutcome),
    Submit(TaskId),
    Poll(TaskId),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub(crate) struct Registry {
    tasks: RwLock<HashMap<TaskId, TaskEntry>>,
    events: broadcast::Sender<TaskEvent>,
    notifier: mpsc::UnboundedSender<Notification>,
}

impl Registry {
    pub fn new(
        events: broadcast::Sender<TaskEvent>,
        notifier: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            events,
            notifier,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Register a new task together with its callbacks.
    pub fn insert(
        &self,
        entry: TaskEntry,
        on_progress: Option<ProgressCallback>,
        on_complete: Option<CompletionCallback>,
    ) {
        let task_id = entry.record.id;
        let at = entry.record.created_at;
        // Callbacks are registered before the scheduler can see the task.
        let _ = self.notifier.send(Notification::Register {
            task_id,
            on_progress,
            on_complete,
        });
        self.write().insert(task_id, entry);
        let _ = self.events.send(TaskEvent::Queued { task_id, at });
    }

    pub fn snapshot(&self, id: TaskId) -> Option<TaskRecord> {
        self.read().get(&id).map(|entry| entry.record.clone())
    }

    pub fn list(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> =
            self.read().values().map(|entry| entry.record.clone()).collect();
        records.sort_by_key(|record| record.id);
        records
    }

    pub fn active_count(&self) -> usize {
        self.read()
            .values()
            .filter(|entry| !entry.record.is_terminal())
            .count()
    }

    /// Raise the cancellation flag.
    ///
    /// Returns `None` for unknown ids, `Some(false)` when the task is
    /// already terminal or already cancelled.
    pub fn request_cancel(&self, id: TaskId) -> Option<bool> {
        let mut tasks = self.write();
        let entry = tasks.get_mut(&id)?;
        if entry.record.is_terminal() || entry.cancel.is_cancelled() {
            return Some(false);
        }
        entry.cancel.cancel();
        entry.record.cancel_requested = true;
        Some(true)
    }

    /// Raise the cancellation flag of every unfinished task.
    pub fn cancel_all(&self) -> usize {
        let mut tasks = self.write();
        let mut count = 0;
        for entry in tasks.values_mut() {
            if !entry.record.is_terminal() && !entry.cancel.is_cancelled() {
                entry.cancel.cancel();
                entry.record.cancel_requested = true;
                count += 1;
            }
        }
        count
    }

    // ---- scheduling ----

    /// Choose one action per idle task and claim the tasks that need a
    /// worker.
    pub fn plan(&self, now: Instant) -> Vec<Action> {
        let mut tasks = self.write();
        let mut actions = Vec::new();

        for (id, entry) in tasks.iter_mut() {
            if entry.in_flight || entry.record.is_terminal() {
                continue;
            }
            if let Some(outcome) = entry.interruption(now) {
                actions.push(Action::Settle(*id, outcome));
                continue;
            }
            match entry.record.state {
                TaskState::Queued => {
                    entry.in_flight = true;
                    actions.push(Action::Submit(*id));
                }
                TaskState::Submitted | TaskState::Polling if now >= entry.next_action_at => {
                    entry.in_flight = true;
                    actions.push(Action::Poll(*id));
                }
                _ => {}
            }
        }
        actions
    }

    /// Unfinished tasks with no worker attached.
    pub fn idle_unfinished(&self) -> Vec<TaskId> {
        self.read()
            .iter()
            .filter(|(_, entry)| !entry.in_flight && !entry.record.is_terminal())
            .map(|(id, _)| *id)
            .collect()
    }

    /// The worker driving `id` has returned.
    pub fn finish_step(&self, id: TaskId) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.in_flight = false;
        }
    }

    /// Check for cancellation or timeout at a safe point.
    pub fn safe_point(&self, id: TaskId) -> Option<TaskOutcome> {
        let now = Instant::now();
        match self.read().get(&id) {
            Some(entry) if !entry.record.is_terminal() => entry.interruption(now),
            _ => None,
        }
    }

    /// Drop terminal records older than `retention`.
    pub fn evict_expired(&self, now: Instant, retention: Duration) -> usize {
        let mut tasks = self.write();
        let before = tasks.len();
        tasks.retain(|id, entry| {
            let expired = entry
                .finished
                .is_some_and(|at| now.saturating_duration_since(at) >= retention);
            if expired {
                tracing::debug!(task_id = %id, "Evicting finished task");
            }
            !expired
        });
        before - tasks.len()
    }

    // ---- transitions ----

    /// Move a task to `to`, applying `apply` to the entry first.
    ///
    /// Returns `false` (and changes nothing) when the task is unknown or
    /// the move is not allowed.
    pub fn transition<F>(&self, id: TaskId, to: TaskState, apply: F) -> bool
    where
        F: FnOnce(&mut TaskEntry),
    {
        let mut tasks = self.write();
        let Some(entry) = tasks.get_mut(&id) else {
            return false;
        };
        let from = entry.record.state;
        if !from.can_transition_to(to) {
            if from.is_terminal() {
                tracing::debug!(task_id = %id, from = %from, to = %to, "Ignoring transition of finished task");
            } else {
                tracing::error!(task_id = %id, from = %from, to = %to, "Illegal task transition rejected");
            }
            return false;
        }

        apply(entry);

        let at = chrono::Utc::now();
        let record = &mut entry.record;
        record.state = to;
        record.last_transition_at = at;
        record.history.push(Transition { state: to, at });
        if to.is_terminal() {
            record.finished_at = Some(at);
            entry.finished = Some(Instant::now());
        }

        let _ = self.events.send(TaskEvent::StateChanged {
            task_id: id,
            from,
            to,
            at,
        });

        let message = match to {
            TaskState::Submitted => Some(MSG_STARTED),
            TaskState::Fetching => Some(MSG_FETCHING),
            TaskState::Converting => Some(MSG_CONVERTING),
            _ => None,
        };
        if let Some(message) = message {
            self.progress_locked(id, message.to_string());
        }
        if let Some(outcome) = entry.record.outcome() {
            let _ = self.events.send(TaskEvent::Progress {
                task_id: id,
                message: crate::dispatch::outcome_message(&outcome),
            });
            let _ = self.notifier.send(Notification::Finished {
                task_id: id,
                outcome,
            });
        }

        tracing::debug!(task_id = %id, from = %from, to = %to, "Task transitioned");
        true
    }

    /// Record an in-progress poll: `Polling -> Polling`, reschedule, and
    /// report the status string when it changed.
    pub fn record_in_progress(&self, id: TaskId, status: String, next_action_at: Instant) -> bool {
        let mut changed = false;
        let moved = self.transition(id, TaskState::Polling, |entry| {
            entry.next_action_at = next_action_at;
            if entry.record.last_status_message.as_deref() != Some(status.as_str()) {
                entry.record.last_status_message = Some(status.clone());
                changed = true;
            }
        });
        if moved && changed {
            // Re-check under the lock so nothing follows a terminal state.
            let tasks = self.read();
            if tasks.get(&id).is_some_and(|e| !e.record.is_terminal()) {
                self.progress_locked(id, status_message(&status));
            }
        }
        moved
    }

    /// Push back the next poll without a transition (transient failure).
    pub fn reschedule(&self, id: TaskId, next_action_at: Instant) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.next_action_at = next_action_at;
        }
    }

    /// Hand the task's scratch directory to the registry for cleanup.
    pub fn attach_workdir(&self, id: TaskId, dir: TempDir) {
        let rejected = {
            let mut tasks = self.write();
            match tasks.get_mut(&id) {
                Some(entry) if !entry.record.cleaned_up => {
                    entry.workdir = Some(dir);
                    None
                }
                _ => Some(dir),
            }
        };
        // Already cleaned up (or evicted): nothing will reclaim it later.
        if let Some(dir) = rejected {
            remove_workdir(id, dir);
        }
    }

    /// Delete the task's scratch files. Runs once; later calls find
    /// nothing to do.
    pub fn cleanup(&self, id: TaskId) {
        let dir = {
            let mut tasks = self.write();
            let Some(entry) = tasks.get_mut(&id) else {
                return;
            };
            if entry.record.cleaned_up {
                return;
            }
            entry.record.cleaned_up = true;
            entry.workdir.take()
        };
        if let Some(dir) = dir {
            remove_workdir(id, dir);
        }
    }

    /// Clean up, then move the task into the outcome's terminal state.
    pub fn settle(&self, id: TaskId, outcome: TaskOutcome) -> bool {
        let active = self
            .read()
            .get(&id)
            .is_some_and(|entry| !entry.record.is_terminal());
        if !active {
            return false;
        }
        self.cleanup(id);

        let to = outcome.state();
        let settled = self.transition(id, to, |entry| match &outcome {
            TaskOutcome::Completed { output_path } => {
                entry.record.result = Some(output_path.clone())
            }
            TaskOutcome::Failed { error } => entry.record.error = Some(error.clone()),
            TaskOutcome::Cancelled => {}
        });

        if settled {
            match &outcome {
                TaskOutcome::Completed { output_path } => {
                    tracing::info!(task_id = %id, output = %output_path.display(), "Task completed")
                }
                TaskOutcome::Failed { error } => {
                    tracing::error!(task_id = %id, kind = error.kind(), error = %error, "Task failed")
                }
                TaskOutcome::Cancelled => tracing::info!(task_id = %id, "Task cancelled"),
            }
        }
        settled
    }

    // ---- private helpers ----

    fn progress_locked(&self, id: TaskId, message: String) {
        let _ = self.events.send(TaskEvent::Progress {
            task_id: id,
            message: message.clone(),
        });
        let _ = self.notifier.send(Notification::Progress {
            task_id: id,
            message,
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, TaskEntry>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, TaskEntry>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove_workdir(id: TaskId, dir: TempDir) {
    let path = dir.path().to_path_buf();
    match dir.close() {
        Ok(()) => tracing::debug!(task_id = %id, path = %path.display(), "Scratch directory removed"),
        Err(e) => tracing::warn!(
            task_id = %id,
            path = %path.display(),
            error = %e,
            "Failed to remove scratch directory",
        ),
    }
}
