//! Task requests and the point-in-time task record returned to callers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hunyuan3d_core::generation::GenerationOptions;
use hunyuan3d_core::task::{TaskError, TaskOutcome, TaskState};
use hunyuan3d_core::types::{TaskId, Timestamp};
use serde::Serialize;

/// Receives human-readable status strings for one task.
pub type ProgressCallback = Arc<dyn Fn(TaskId, &str) + Send + Sync>;

/// Receives the final outcome of one task, exactly once.
pub type CompletionCallback = Arc<dyn Fn(TaskId, &TaskOutcome) + Send + Sync>;

// ---------------------------------------------------------------------------
// TaskRequest
// ---------------------------------------------------------------------------

/// A generation request as handed to [`TaskManager::submit`].
///
/// Optional fields fall back to the manager's defaults at submission time.
///
/// [`TaskManager::submit`]: crate::manager::TaskManager::submit
#[derive(Clone)]
pub struct TaskRequest {
    pub image_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub options: GenerationOptions,
    /// Poll interval in seconds.
    pub poll_interval_secs: Option<f64>,
    pub timeout: Option<Duration>,
    pub on_progress: Option<ProgressCallback>,
    pub on_complete: Option<CompletionCallback>,
}

impl TaskRequest {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            output_path: None,
            endpoint: None,
            options: GenerationOptions::default(),
            poll_interval_secs: None,
            timeout: None,
            on_progress: None,
            on_complete: None,
        }
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn poll_interval_secs(mut self, secs: f64) -> Self {
        self.poll_interval_secs = Some(secs);
        self
    }

    /// Override the manager-wide task timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(TaskId, &str) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(TaskId, &TaskOutcome) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRequest")
            .field("image_path", &self.image_path)
            .field("output_path", &self.output_path)
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TaskParams
// ---------------------------------------------------------------------------

/// Resolved, immutable request parameters captured at submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskParams {
    pub image_path: PathBuf,
    pub output_path: PathBuf,
    pub endpoint: String,
    pub options: GenerationOptions,
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
}

// ---------------------------------------------------------------------------
// TaskRecord
// ---------------------------------------------------------------------------

/// One entry of a task's transition history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub state: TaskState,
    pub at: Timestamp,
}

/// Snapshot of a task's lifecycle.
///
/// `result` is present only in `Completed` and `error` only in `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub state: TaskState,
    pub params: TaskParams,
    /// Identifier assigned by the generation service, once acknowledged.
    pub remote_job_id: Option<String>,
    pub result: Option<PathBuf>,
    pub error: Option<TaskError>,
    pub cancel_requested: bool,
    /// Most recent raw status string reported while polling.
    pub last_status_message: Option<String>,
    pub created_at: Timestamp,
    pub last_transition_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    /// Whether the task's scratch files have been reclaimed.
    pub cleaned_up: bool,
    /// Every state the task entered, in order, starting with `Queued`.
    pub history: Vec<Transition>,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, params: TaskParams, now: Timestamp) -> Self {
        Self {
            id,
            state: TaskState::Queued,
            params,
            remote_job_id: None,
            result: None,
            error: None,
            cancel_requested: false,
            last_status_message: None,
            created_at: now,
            last_transition_at: now,
            finished_at: None,
            cleaned_up: false,
            history: vec![Transition {
                state: TaskState::Queued,
                at: now,
            }],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The states visited so far, in order.
    pub fn states(&self) -> Vec<TaskState> {
        self.history.iter().map(|t| t.state).collect()
    }

    pub fn output_path(&self) -> &Path {
        &self.params.output_path
    }

    /// The terminal outcome, once there is one.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self.state {
            TaskState::Completed => Some(TaskOutcome::Completed {
                output_path: self
                    .result
                    .clone()
                    .unwrap_or_else(|| self.params.output_path.clone()),
            }),
            TaskState::Failed => Some(TaskOutcome::Failed {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| TaskError::Internal("missing error".into())),
            }),
            TaskState::Cancelled => Some(TaskOutcome::Cancelled),
            _ => None,
        }
    }
}
