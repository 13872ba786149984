//! "Generate" command façade.
//!
//! Wraps a single [`TaskManager::submit`] call in the shape a host command
//! framework expects: execute returns immediately with a flat response, and
//! undo maps to cancelling the task it started.

use std::path::PathBuf;

use hunyuan3d_core::types::TaskId;
use serde::Serialize;

use crate::manager::{ManagerError, TaskManager};
use crate::record::TaskRequest;

/// Result of executing a [`GenerateCommand`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub task_id: Option<TaskId>,
    pub output_path: Option<PathBuf>,
    pub endpoint: Option<String>,
    /// Validation message when `success` is false.
    pub error: Option<String>,
}

/// Fire-and-forget generation command.
#[derive(Debug, Clone)]
pub struct GenerateCommand {
    request: TaskRequest,
    task_id: Option<TaskId>,
}

impl GenerateCommand {
    pub fn new(request: TaskRequest) -> Self {
        Self {
            request,
            task_id: None,
        }
    }

    /// The task started by the last successful [`execute`](Self::execute).
    pub fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    /// Submit the request. Never waits for network activity.
    pub fn execute(&mut self, manager: &TaskManager) -> GenerateResponse {
        let submitted = manager
            .submit(self.request.clone())
            .and_then(|id| manager.get_status(id));

        match submitted {
            Ok(record) => {
                self.task_id = Some(record.id);
                GenerateResponse {
                    success: true,
                    task_id: Some(record.id),
                    output_path: Some(record.params.output_path),
                    endpoint: Some(record.params.endpoint),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    image = %self.request.image_path.display(),
                    error = %e,
                    "Generate command rejected",
                );
                GenerateResponse {
                    success: false,
                    task_id: None,
                    output_path: None,
                    endpoint: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Cancel the task started by this command.
    ///
    /// Returns `Ok(false)` when nothing was started or the task already
    /// finished.
    pub fn undo(&self, manager: &TaskManager) -> Result<bool, ManagerError> {
        match self.task_id {
            Some(id) => manager.cancel(id),
            None => Ok(false),
        }
    }
}
