//! Hunyuan3D API wire types.
//!
//! The server accepts a JSON body with a base64 image and the generation
//! options flattened next to it, answers `/send` with a task `uid`, and
//! reports progress on `/status/{uid}` as `{"status", "model_base64",
//! "message"}`.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hunyuan3d_core::generation::GenerationOptions;
use serde::{Deserialize, Serialize};

use crate::client::RemoteStatus;

// ---------------------------------------------------------------------------
// Status strings
// ---------------------------------------------------------------------------

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_TEXTURING: &str = "texturing";
pub const STATUS_ERROR: &str = "error";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of a `/send` request: the input image plus generation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Base64-encoded image bytes (plain base64, not a data URL).
    pub image: String,
    #[serde(flatten)]
    pub options: GenerationOptions,
}

impl JobSpec {
    pub fn from_image_bytes(bytes: &[u8], options: GenerationOptions) -> Self {
        Self {
            image: STANDARD.encode(bytes),
            options,
        }
    }

    /// Read and encode an image file.
    pub async fn from_image_file(
        path: &Path,
        options: GenerationOptions,
    ) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::from_image_bytes(&bytes, options))
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Response of `/send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub uid: String,
}

/// Response of `/status/{uid}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    /// Base64 GLB payload, present once `status == "completed"`.
    #[serde(default)]
    pub model_base64: Option<String>,
    /// Error or progress detail reported by the server.
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusResponse {
    /// Interpret the raw status string.
    ///
    /// Anything other than `completed` or `error` is treated as still in
    /// progress, so new server-side phases do not break polling.
    pub fn to_remote_status(&self) -> RemoteStatus {
        match self.status.as_str() {
            STATUS_COMPLETED => RemoteStatus::Complete,
            STATUS_ERROR => RemoteStatus::Error {
                message: self
                    .message
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
            other => RemoteStatus::InProgress {
                status: other.to_string(),
            },
        }
    }
}

/// Response of `/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub worker_id: String,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// One entry of a FastAPI-style 422 `detail` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetail {
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
    pub msg: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Body of a 422 response.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpValidationError {
    #[serde(default)]
    pub detail: Vec<ValidationDetail>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
