//! Remote job capability consumed by the task orchestrator.
//!
//! The orchestrator only ever talks to a generation service through
//! [`RemoteJobClient`]; network protocol, timeouts, and authentication are
//! the implementation's concern.

use async_trait::async_trait;

use crate::messages::{HealthResponse, JobSpec, ValidationDetail};

/// Interpreted status of a remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Still running; `status` is the raw phase reported by the server.
    InProgress { status: String },
    /// Finished; the result can be fetched.
    Complete,
    /// The server gave up on the job.
    Error { message: String },
}

/// Errors from a remote job client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Hunyuan3D API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The service rejected the request parameters (HTTP 422).
    #[error("Validation errors: {}", format_details(.0))]
    Validation(Vec<ValidationDetail>),

    /// The job has not finished, so there is nothing to fetch yet.
    #[error("Job is not complete (status: {0})")]
    NotReady(String),

    /// The job finished but the response carried no model data.
    #[error("No model data received from completed task")]
    MissingModel,

    /// The model payload could not be decoded.
    #[error("Invalid model payload: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_details(details: &[ValidationDetail]) -> String {
    details
        .iter()
        .map(|d| d.msg.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Synchronous request/response surface of a generation service.
///
/// Every call receives the endpoint explicitly so that one shared client
/// can serve tasks that override the default server.
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Queue a generation job and return its remote identifier.
    async fn submit(&self, endpoint: &str, job: &JobSpec) -> Result<String, ClientError>;

    /// Query the current status of a remote job.
    async fn poll(&self, endpoint: &str, job_id: &str) -> Result<RemoteStatus, ClientError>;

    /// Retrieve the raw generated asset of a completed job.
    async fn fetch(&self, endpoint: &str, job_id: &str) -> Result<Vec<u8>, ClientError>;

    /// Check that the service is up.
    async fn health(&self, endpoint: &str) -> Result<HealthResponse, ClientError>;
}
