//! Hunyuan3D task orchestration.
//!
//! [`TaskManager`](manager::TaskManager) drives image-to-3D generation tasks
//! through submit, poll, fetch, and convert against a
//! [`RemoteJobClient`](hunyuan3d_client::RemoteJobClient) and an
//! [`AssetConverter`](converter::AssetConverter), with cooperative
//! cancellation, progress callbacks, and per-task scratch cleanup.

pub mod command;
pub mod config;
pub mod converter;
pub mod dispatch;
pub mod events;
pub mod manager;
pub mod record;

mod pipeline;
mod registry;
mod scheduler;

pub use command::{GenerateCommand, GenerateResponse};
pub use config::{ConfigError, ManagerConfig};
pub use converter::{AssetConverter, ConversionError, SubprocessConverter};
pub use events::TaskEvent;
pub use manager::{ManagerError, TaskManager};
pub use record::{TaskParams, TaskRecord, TaskRequest};
