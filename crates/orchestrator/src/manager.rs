//! Task orchestration manager.
//!
//! [`TaskManager`] accepts generation requests, tracks every task in a
//! shared registry, and owns the background scheduler that drives each task
//! through submit, poll, fetch, and convert. The public query and control
//! operations are synchronous and lock-only, so they can be called from any
//! context without waiting on network activity.
//!
//! Task events are broadcast via a [`tokio::sync::broadcast`] channel. Call
//! [`TaskManager::subscribe`] to receive them.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use hunyuan3d_client::RemoteJobClient;
use hunyuan3d_core::error::CoreError;
use hunyuan3d_core::generation::{
    default_output_path, validate_endpoint, validate_input_image, validate_poll_interval,
};
use hunyuan3d_core::task::TaskOutcome;
use hunyuan3d_core::types::{new_task_id, TaskId};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ManagerConfig;
use crate::converter::AssetConverter;
use crate::dispatch::run_dispatcher;
use crate::events::{TaskEvent, EVENT_CHANNEL_CAPACITY};
use crate::record::{
    CompletionCallback, ProgressCallback, TaskParams, TaskRecord, TaskRequest,
};
use crate::registry::{Registry, TaskEntry};
use crate::scheduler::{self, Shared};

/// Process-wide defaults applied to newly submitted tasks.
#[derive(Debug, Clone)]
struct Defaults {
    endpoint: String,
    poll_interval: Duration,
}

/// Orchestrates remote generation tasks.
///
/// Created once at startup via [`TaskManager::start`]. The returned `Arc`
/// can be cheaply cloned into every caller.
pub struct TaskManager {
    shared: Arc<Shared>,
    defaults: RwLock<Defaults>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    /// Spawn the scheduler loop and the callback dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        client: Arc<dyn RemoteJobClient>,
        converter: Arc<dyn AssetConverter>,
        config: ManagerConfig,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatcher(notify_rx));

        let defaults = Defaults {
            endpoint: config.default_endpoint.clone(),
            poll_interval: config.default_poll_interval,
        };
        let shared = Arc::new(Shared {
            registry: Registry::new(event_tx, notify_tx),
            client,
            converter,
            config,
            wake: Notify::new(),
            stop: CancellationToken::new(),
        });
        let handle = tokio::spawn(scheduler::run(Arc::clone(&shared)));

        Arc::new(Self {
            shared,
            defaults: RwLock::new(defaults),
            scheduler: Mutex::new(Some(handle)),
        })
    }

    /// Subscribe to task events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.shared.registry.subscribe()
    }

    /// Validate and queue a generation request.
    ///
    /// Returns as soon as the task is registered; all network work happens
    /// on the scheduler.
    pub fn submit(&self, request: TaskRequest) -> Result<TaskId, ManagerError> {
        if self.shared.stop.is_cancelled() {
            return Err(ManagerError::ShuttingDown);
        }

        request.options.check()?;
        validate_input_image(&request.image_path)?;

        let defaults = self.defaults();
        let endpoint = match &request.endpoint {
            Some(url) => validate_endpoint(url)?,
            None => defaults.0,
        };
        let poll_interval = match request.poll_interval_secs {
            Some(secs) => validate_poll_interval(secs)?,
            None => defaults.1,
        };
        let timeout = match request.timeout {
            Some(timeout) if timeout.is_zero() => {
                return Err(ManagerError::validation("Task timeout must be positive"));
            }
            Some(timeout) => Some(timeout),
            None => self.shared.config.task_timeout,
        };
        let output_path = request
            .output_path
            .clone()
            .unwrap_or_else(|| default_output_path(&request.image_path));
        if output_path.is_dir() {
            return Err(ManagerError::validation(format!(
                "Output path is a directory: {}",
                output_path.display()
            )));
        }

        let params = TaskParams {
            image_path: request.image_path,
            output_path,
            endpoint,
            options: request.options,
            poll_interval,
            timeout,
        };

        let id = new_task_id();
        let record = TaskRecord::new(id, params, chrono::Utc::now());
        tracing::info!(
            task_id = %id,
            image = %record.params.image_path.display(),
            output = %record.params.output_path.display(),
            endpoint = %record.params.endpoint,
            "Task submitted",
        );

        self.register(record, request.on_progress, request.on_complete)
    }

    /// Insert a validated record and wake the scheduler.
    ///
    /// A shutdown may finish its final pass between the check at the top of
    /// `submit` and this insert; such a record is settled as cancelled here
    /// since no loop is left to do it.
    fn register(
        &self,
        record: TaskRecord,
        on_progress: Option<ProgressCallback>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<TaskId, ManagerError> {
        let id = record.id;
        self.shared.registry.insert(
            TaskEntry::new(record, Instant::now()),
            on_progress,
            on_complete,
        );
        if self.shared.stop.is_cancelled() {
            self.shared.registry.settle(id, TaskOutcome::Cancelled);
            return Err(ManagerError::ShuttingDown);
        }
        self.shared.wake.notify_one();
        Ok(id)
    }

    /// Point-in-time copy of a task record.
    pub fn get_status(&self, id: TaskId) -> Result<TaskRecord, ManagerError> {
        self.shared
            .registry
            .snapshot(id)
            .ok_or_else(|| ManagerError::not_found(id))
    }

    /// Request cancellation.
    ///
    /// Returns `true` if the task was active and this call raised its flag;
    /// `false` if it had already finished or been cancelled.
    pub fn cancel(&self, id: TaskId) -> Result<bool, ManagerError> {
        let raised = self
            .shared
            .registry
            .request_cancel(id)
            .ok_or_else(|| ManagerError::not_found(id))?;
        if raised {
            tracing::info!(task_id = %id, "Cancellation requested");
            self.shared.wake.notify_one();
        }
        Ok(raised)
    }

    /// Change the endpoint used by subsequently submitted tasks.
    pub fn set_default_endpoint(&self, url: &str) -> Result<(), ManagerError> {
        let endpoint = validate_endpoint(url)?;
        tracing::info!(endpoint = %endpoint, "Default endpoint changed");
        self.write_defaults().endpoint = endpoint;
        Ok(())
    }

    /// Change the poll interval used by subsequently submitted tasks.
    pub fn set_default_poll_interval(&self, secs: f64) -> Result<(), ManagerError> {
        let interval = validate_poll_interval(secs)?;
        tracing::info!(poll_interval_secs = secs, "Default poll interval changed");
        self.write_defaults().poll_interval = interval;
        Ok(())
    }

    /// Current default endpoint and poll interval.
    pub fn defaults(&self) -> (String, Duration) {
        let defaults = self
            .defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        (defaults.endpoint.clone(), defaults.poll_interval)
    }

    /// Snapshots of every retained task, ordered by id (creation order).
    pub fn list(&self) -> Vec<TaskRecord> {
        self.shared.registry.list()
    }

    /// Number of tasks that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        self.shared.registry.active_count()
    }

    /// Whether the scheduler is still accepting work.
    pub fn is_running(&self) -> bool {
        !self.shared.stop.is_cancelled()
    }

    /// Wait until the task reaches a terminal state.
    pub async fn wait(&self, id: TaskId) -> Result<TaskRecord, ManagerError> {
        let mut events = self.subscribe();
        loop {
            let record = self.get_status(id)?;
            if record.is_terminal() {
                return Ok(record);
            }
            loop {
                match events.recv().await {
                    Ok(event) if event.task_id() == id && event.is_terminal() => break,
                    Ok(_) => continue,
                    // Missed events; re-check the record.
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(ManagerError::ShuttingDown)
                    }
                }
            }
        }
    }

    /// Cancel every active task and stop the scheduler.
    ///
    /// Returns once the loop has exited. Workers already in flight finish
    /// their current call and then settle as cancelled.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down task manager");
        let cancelled = self.shared.registry.cancel_all();
        self.shared.stop.cancel();
        self.shared.wake.notify_one();

        let handle = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Task scheduler exited abnormally");
            }
        }

        tracing::info!(cancelled, "Task manager shut down complete");
    }

    // ---- private helpers ----

    fn write_defaults(&self) -> std::sync::RwLockWriteGuard<'_, Defaults> {
        self.defaults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Errors returned by the manager's public operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The manager has been shut down and accepts no new work.
    #[error("Task manager is shutting down")]
    ShuttingDown,
}

impl ManagerError {
    pub fn validation(message: impl Into<String>) -> Self {
        ManagerError::Core(CoreError::Validation(message.into()))
    }

    pub fn not_found(id: TaskId) -> Self {
        ManagerError::Core(CoreError::NotFound { entity: "Task", id })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ManagerError::Core(CoreError::NotFound { .. }))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ManagerError::Core(CoreError::Validation(_)))
    }
}
