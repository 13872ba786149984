//! Task lifecycle states, legal transitions, and terminal outcomes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TaskState
// ---------------------------------------------------------------------------

/// Lifecycle state of a single generation task.
///
/// Progresses `Queued -> Submitted -> Polling -> Fetching -> Converting ->
/// Completed`, with `Failed` and `Cancelled` reachable from any non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted locally, not yet sent to the generation service.
    Queued,
    /// The service acknowledged the job and assigned a remote id.
    Submitted,
    /// Waiting for the remote job to finish.
    Polling,
    /// Downloading the generated asset.
    Fetching,
    /// Converting the downloaded asset into the scene format.
    Converting,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// `true` for `Completed`, `Failed`, and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Polling -> Polling` is legal (one per in-progress poll); every
    /// other self-loop and every move out of a terminal state is not.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed | Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Queued, Submitted)
                | (Submitted, Polling)
                | (Polling, Polling)
                | (Polling, Fetching)
                | (Fetching, Converting)
                | (Converting, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Submitted => "submitted",
            TaskState::Polling => "polling",
            TaskState::Fetching => "fetching",
            TaskState::Converting => "converting",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskError
// ---------------------------------------------------------------------------

/// Structured failure reason attached to a task in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    /// The generation service refused or never acknowledged the job.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// The generation service reported the job as failed.
    #[error("Generation failed: {0}")]
    Remote(String),

    /// The generated asset could not be retrieved or stored locally.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The asset converter rejected the downloaded asset.
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// The task did not reach a terminal state within its time budget.
    #[error("Task timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    /// A worker crashed while driving the task.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Short machine-readable tag, matching the serialized `kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Submission(_) => "submission",
            TaskError::Remote(_) => "remote",
            TaskError::Fetch(_) => "fetch",
            TaskError::Conversion(_) => "conversion",
            TaskError::Timeout { .. } => "timeout",
            TaskError::Internal(_) => "internal",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskOutcome
// ---------------------------------------------------------------------------

/// Final result of a task, delivered once to its completion callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed { output_path: PathBuf },
    Failed { error: TaskError },
    Cancelled,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }

    /// Terminal state this outcome corresponds to.
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed { .. } => TaskState::Completed,
            TaskOutcome::Failed { .. } => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [TaskState; 8] = [
        TaskState::Queued,
        TaskState::Submitted,
        TaskState::Polling,
        TaskState::Fetching,
        TaskState::Converting,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::Cancelled,
    ];

    #[test]
    fn happy_path_transitions_are_legal() {
        let path = [
            TaskState::Queued,
            TaskState::Submitted,
            TaskState::Polling,
            TaskState::Polling,
            TaskState::Fetching,
            TaskState::Converting,
            TaskState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for from in ALL_STATES.iter().filter(|s| s.is_terminal()) {
            for to in ALL_STATES {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn every_active_state_can_fail_or_cancel() {
        for from in ALL_STATES.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(TaskState::Failed));
            assert!(from.can_transition_to(TaskState::Cancelled));
        }
    }

    #[test]
    fn backwards_and_skipping_moves_are_rejected() {
        assert!(!TaskState::Polling.can_transition_to(TaskState::Submitted));
        assert!(!TaskState::Queued.can_transition_to(TaskState::Polling));
        assert!(!TaskState::Polling.can_transition_to(TaskState::Converting));
        assert!(!TaskState::Fetching.can_transition_to(TaskState::Completed));
        assert!(!TaskState::Queued.can_transition_to(TaskState::Queued));
    }

    #[test]
    fn exactly_three_terminal_states() {
        assert_eq!(ALL_STATES.iter().filter(|s| s.is_terminal()).count(), 3);
    }

    #[test]
    fn task_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(TaskError::Remote("bad image".into())).unwrap();
        assert_eq!(json["kind"], "remote");
        assert_eq!(json["detail"], "bad image");
        assert_eq!(TaskError::Remote(String::new()).kind(), "remote");
    }

    #[test]
    fn timeout_display_includes_elapsed() {
        let err = TaskError::Timeout { elapsed_secs: 90 };
        assert_eq!(err.to_string(), "Task timed out after 90s");
    }

    #[test]
    fn outcome_maps_to_terminal_state() {
        assert_eq!(TaskOutcome::Cancelled.state(), TaskState::Cancelled);
        let done = TaskOutcome::Completed {
            output_path: PathBuf::from("/tmp/out.usd"),
        };
        assert!(done.is_success());
        assert!(done.state().is_terminal());
    }
}
