/// Task identifiers are UUID v7 so they sort by creation time.
pub type TaskId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Allocate a fresh, never-reused task identifier.
pub fn new_task_id() -> TaskId {
    uuid::Uuid::now_v7()
}
