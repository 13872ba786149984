//! REST client for the Hunyuan3D API server.
//!
//! Wraps the `/send`, `/status/{uid}`, and `/health` endpoints using
//! [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::StatusCode;

use crate::client::{ClientError, RemoteJobClient, RemoteStatus};
use crate::messages::{
    HealthResponse, HttpValidationError, JobSpec, SendResponse, StatusResponse, STATUS_COMPLETED,
};

/// HTTP client shared by every task, regardless of which endpoint it targets.
#[derive(Debug, Clone)]
pub struct HunyuanApi {
    client: reqwest::Client,
}

impl HunyuanApi {
    /// Create a client with the given per-request timeout.
    pub fn new(request_timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch the raw status document of a job.
    pub async fn status(&self, endpoint: &str, job_id: &str) -> Result<StatusResponse, ClientError> {
        let response = self
            .client
            .get(url(endpoint, &format!("/status/{job_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code.
    ///
    /// A 422 body is parsed into structured validation details when it
    /// has the expected shape; any other failure keeps the raw body.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            if let Ok(parsed) = serde_json::from_str::<HttpValidationError>(&body) {
                if !parsed.detail.is_empty() {
                    return Err(ClientError::Validation(parsed.detail));
                }
            }
        }
        Err(ClientError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RemoteJobClient for HunyuanApi {
    async fn submit(&self, endpoint: &str, job: &JobSpec) -> Result<String, ClientError> {
        let response = self
            .client
            .post(url(endpoint, "/send"))
            .json(job)
            .send()
            .await?;

        let sent: SendResponse = Self::parse_response(response).await?;
        tracing::debug!(endpoint, uid = %sent.uid, "Generation job accepted");
        Ok(sent.uid)
    }

    async fn poll(&self, endpoint: &str, job_id: &str) -> Result<RemoteStatus, ClientError> {
        Ok(self.status(endpoint, job_id).await?.to_remote_status())
    }

    /// The server inlines the finished model into the status document, so
    /// fetching re-reads the status and decodes the payload.
    async fn fetch(&self, endpoint: &str, job_id: &str) -> Result<Vec<u8>, ClientError> {
        let status = self.status(endpoint, job_id).await?;
        if status.status != STATUS_COMPLETED {
            return Err(ClientError::NotReady(status.status));
        }
        let encoded = status.model_base64.ok_or(ClientError::MissingModel)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn health(&self, endpoint: &str) -> Result<HealthResponse, ClientError> {
        let response = self.client.get(url(endpoint, "/health")).send().await?;
        Self::parse_response(response).await
    }
}

fn url(endpoint: &str, path: &str) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), path)
}
