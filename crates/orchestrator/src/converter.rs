//! Asset conversion capability and its subprocess implementation.
//!
//! [`SubprocessConverter`] shells out to an external tool invoked as
//! `<program> [args...] <source> <destination>`, captures stderr, and kills
//! the child when the timeout expires.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stderr captured from the converter.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Stderr characters kept in the error message.
const STDERR_EXCERPT_CHARS: usize = 2000;

/// Errors from an asset conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The converter process could not be started.
    #[error("Failed to start converter: {0}")]
    Spawn(#[source] std::io::Error),

    /// The converter exited with a non-zero status.
    #[error("Converter exited with code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },

    /// The converter did not finish in time and was killed.
    #[error("Converter timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The converter reported success but wrote nothing.
    #[error("Converter did not produce {0}")]
    MissingOutput(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a downloaded asset into the host's scene format.
#[async_trait]
pub trait AssetConverter: Send + Sync {
    /// Convert the asset at `source`, writing the result to `destination`.
    async fn convert(&self, source: &Path, destination: &Path) -> Result<(), ConversionError>;
}

/// Runs an external conversion program.
#[derive(Debug, Clone)]
pub struct SubprocessConverter {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessConverter {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Arguments placed before the source and destination paths.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl AssetConverter for SubprocessConverter {
    async fn convert(&self, source: &Path, destination: &Path) -> Result<(), ConversionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(source)
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(ConversionError::Spawn)?;

        let stderr_handle = child.stderr.take();
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        // On timeout `child` is dropped, which kills the process.
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                return Err(ConversionError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
        };
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        tracing::debug!(
            program = %self.program.display(),
            exit_code = status.code().unwrap_or(-1),
            duration_ms = start.elapsed().as_millis() as u64,
            "Converter finished",
        );

        if !status.success() {
            return Err(ConversionError::Failed {
                exit_code: status.code().unwrap_or(-1),
                stderr: excerpt(&String::from_utf8_lossy(&stderr_bytes)),
            });
        }
        if !tokio::fs::try_exists(destination).await.unwrap_or(false) {
            return Err(ConversionError::MissingOutput(destination.to_path_buf()));
        }
        Ok(())
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_STDERR_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_STDERR_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

/// Keep the tail of stderr, where tools usually print the actual error.
fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - STDERR_EXCERPT_CHARS).collect();
    format!("...{tail}")
}
