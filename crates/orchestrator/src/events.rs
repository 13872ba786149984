//! Task events broadcast by the manager.
//!
//! Every transition and progress message is published on a
//! [`tokio::sync::broadcast`] channel. Call
//! [`TaskManager::subscribe`](crate::manager::TaskManager::subscribe) to
//! receive them.

use hunyuan3d_core::task::TaskState;
use hunyuan3d_core::types::{TaskId, Timestamp};
use serde::Serialize;

/// Broadcast channel capacity for task events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A lifecycle event of one task.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// The task was accepted and queued.
    Queued { task_id: TaskId, at: Timestamp },

    /// The task moved between states.
    StateChanged {
        task_id: TaskId,
        from: TaskState,
        to: TaskState,
        at: Timestamp,
    },

    /// A human-readable status update.
    Progress { task_id: TaskId, message: String },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Queued { task_id, .. }
            | TaskEvent::StateChanged { task_id, .. }
            | TaskEvent::Progress { task_id, .. } => *task_id,
        }
    }

    /// `true` if this event moved the task into a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::StateChanged { to, .. } if to.is_terminal())
    }
}
