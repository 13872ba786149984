//! Hand-written collaborator doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hunyuan3d_client::messages::HealthResponse;
use hunyuan3d_client::{ClientError, JobSpec, RemoteJobClient, RemoteStatus};
use hunyuan3d_orchestrator::{
    AssetConverter, ConversionError, ManagerConfig, TaskManager, TaskRecord,
};
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub const GLB_BYTES: &[u8] = b"glTF-test-model";

// ---------------------------------------------------------------------------
// MockClient
// ---------------------------------------------------------------------------

/// Scripted remote job client.
#[derive(Default)]
pub struct MockClient {
    /// In-progress answers before a job reports complete.
    pub polls_before_complete: usize,
    /// Transport failures returned before the first real answer.
    pub poll_transport_failures: usize,
    /// Every poll answers `error(message)`.
    pub remote_error: Option<String>,
    pub submit_error: Option<String>,
    pub fetch_error: Option<String>,
    /// Job never finishes.
    pub never_complete: bool,
    pub panic_on_poll: bool,
    /// Polls block here after being counted until a permit is added.
    pub poll_gate: Option<Arc<Semaphore>>,

    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub submitted: Mutex<Vec<(String, JobSpec)>>,
    pub polls_by_job: Mutex<HashMap<String, usize>>,
}

impl MockClient {
    pub fn completing_after(polls: usize) -> Self {
        Self {
            polls_before_complete: polls,
            ..Default::default()
        }
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteJobClient for MockClient {
    async fn submit(&self, endpoint: &str, job: &JobSpec) -> Result<String, ClientError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(body) = &self.submit_error {
            return Err(ClientError::Api {
                status: 500,
                body: body.clone(),
            });
        }
        self.submitted
            .lock()
            .unwrap()
            .push((endpoint.to_string(), job.clone()));
        Ok(format!("job-{n}"))
    }

    async fn poll(&self, _endpoint: &str, job_id: &str) -> Result<RemoteStatus, ClientError> {
        let total = self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.poll_gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if self.panic_on_poll {
            panic!("poll exploded");
        }
        if total < self.poll_transport_failures {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        if let Some(message) = &self.remote_error {
            return Ok(RemoteStatus::Error {
                message: message.clone(),
            });
        }

        let seen = {
            let mut polls = self.polls_by_job.lock().unwrap();
            let count = polls.entry(job_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if self.never_complete || seen <= self.polls_before_complete {
            Ok(RemoteStatus::InProgress {
                status: "processing".into(),
            })
        } else {
            Ok(RemoteStatus::Complete)
        }
    }

    async fn fetch(&self, _endpoint: &str, _job_id: &str) -> Result<Vec<u8>, ClientError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match &self.fetch_error {
            Some(_) => Err(ClientError::MissingModel),
            None => Ok(GLB_BYTES.to_vec()),
        }
    }

    async fn health(&self, _endpoint: &str) -> Result<HealthResponse, ClientError> {
        Ok(HealthResponse {
            status: "healthy".into(),
            worker_id: "mock".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockConverter
// ---------------------------------------------------------------------------

/// Copies the staged asset to the destination, or fails on demand.
#[derive(Default)]
pub struct MockConverter {
    pub fail: bool,
    /// Conversions block here after being counted until a permit is added.
    pub gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
    /// Staged source paths, and whether each existed when converted.
    pub sources: Mutex<Vec<(PathBuf, bool)>>,
}

impl MockConverter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetConverter for MockConverter {
    async fn convert(&self, source: &Path, destination: &Path) -> Result<(), ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sources
            .lock()
            .unwrap()
            .push((source.to_path_buf(), source.exists()));
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if self.fail {
            return Err(ConversionError::Failed {
                exit_code: 3,
                stderr: "unsupported mesh".into(),
            });
        }
        let bytes = std::fs::read(source)?;
        std::fs::write(destination, bytes)?;
        Ok(())
    }
}

/// A closed gate; open it with `add_permits`.
pub fn gate() -> Arc<Semaphore> {
    Arc::new(Semaphore::new(0))
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Scratch space for one test: an input image, an output directory, and the
/// temp root handed to the manager.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scratch")).unwrap();
        Self { dir }
    }

    /// Write a fake input image and return its path.
    pub fn image(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"\x89PNG fake image").unwrap();
        path
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    /// Entries left in the temp root.
    pub fn leftover_scratch(&self) -> usize {
        std::fs::read_dir(self.temp_root()).unwrap().count()
    }

    /// Fast configuration rooted in this workspace.
    pub fn config(&self) -> ManagerConfig {
        ManagerConfig {
            default_poll_interval: Duration::from_millis(20),
            tick_interval: Duration::from_millis(10),
            task_timeout: Some(Duration::from_secs(30)),
            retention: Duration::from_secs(60),
            temp_root: self.temp_root(),
            ..ManagerConfig::default()
        }
    }
}

pub fn start(
    client: &Arc<MockClient>,
    converter: &Arc<MockConverter>,
    config: ManagerConfig,
) -> Arc<TaskManager> {
    let client: Arc<dyn RemoteJobClient> = client.clone();
    let converter: Arc<dyn AssetConverter> = converter.clone();
    TaskManager::start(client, converter, config)
}

/// Wait for a task to finish, failing the test after five seconds.
pub async fn finished(manager: &TaskManager, id: hunyuan3d_core::types::TaskId) -> TaskRecord {
    tokio::time::timeout(Duration::from_secs(5), manager.wait(id))
        .await
        .expect("task did not finish in time")
        .expect("task vanished")
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Run `fut` with a five second guard.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}
