//! Generation option defaults, ranges, and request validation.
//!
//! The defaults mirror what the Hunyuan3D API server itself assumes when a
//! field is omitted, so a request built from [`GenerationOptions::default`]
//! behaves exactly like a bare `/send` call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Process-wide defaults
// ---------------------------------------------------------------------------

/// Endpoint used when neither the request nor the manager overrides it.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8081";
/// Seconds between status polls for a single task.
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 2.0;
/// Longest accepted poll interval, in seconds.
pub const MAX_POLL_INTERVAL_SECS: f64 = 3600.0;
/// Suffix appended to the image stem when no output path is given.
pub const OUTPUT_SUFFIX: &str = "_hunyuan3d";
/// Extension of the converted scene file.
pub const OUTPUT_EXTENSION: &str = "usd";

// ---------------------------------------------------------------------------
// Generation option defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_REMOVE_BACKGROUND: bool = true;
pub const DEFAULT_TEXTURE: bool = false;
pub const DEFAULT_SEED: u32 = 1234;
pub const DEFAULT_OCTREE_RESOLUTION: u32 = 256;
pub const DEFAULT_NUM_INFERENCE_STEPS: u32 = 5;
pub const DEFAULT_GUIDANCE_SCALE: f64 = 5.0;
pub const DEFAULT_NUM_CHUNKS: u32 = 8000;
pub const DEFAULT_FACE_COUNT: u32 = 40_000;

// ---------------------------------------------------------------------------
// GenerationOptions
// ---------------------------------------------------------------------------

/// Tunable parameters forwarded to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GenerationOptions {
    /// Strip the image background before meshing.
    pub remove_background: bool,
    /// Generate a texture for the mesh (slower).
    pub texture: bool,
    /// Random seed; identical seeds reproduce identical meshes.
    pub seed: u32,
    #[validate(range(min = 64, max = 1024))]
    pub octree_resolution: u32,
    #[validate(range(min = 1, max = 200))]
    pub num_inference_steps: u32,
    #[validate(range(min = 0.0, max = 30.0))]
    pub guidance_scale: f64,
    #[validate(range(min = 1, max = 1_000_000))]
    pub num_chunks: u32,
    /// Upper bound on the number of faces in the produced mesh.
    #[validate(range(min = 100, max = 2_000_000))]
    pub face_count: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            remove_background: DEFAULT_REMOVE_BACKGROUND,
            texture: DEFAULT_TEXTURE,
            seed: DEFAULT_SEED,
            octree_resolution: DEFAULT_OCTREE_RESOLUTION,
            num_inference_steps: DEFAULT_NUM_INFERENCE_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            num_chunks: DEFAULT_NUM_CHUNKS,
            face_count: DEFAULT_FACE_COUNT,
        }
    }
}

impl GenerationOptions {
    /// Check every option against its allowed range.
    ///
    /// NaN slips through plain range comparisons, so the guidance scale is
    /// additionally required to be finite.
    pub fn check(&self) -> Result<(), CoreError> {
        if !self.guidance_scale.is_finite() {
            return Err(CoreError::Validation(format!(
                "guidance_scale must be a finite number, got {}",
                self.guidance_scale
            )));
        }
        self.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Validate that an endpoint is non-empty and uses http or https.
///
/// Returns the endpoint with surrounding whitespace and trailing slashes
/// removed, ready for path concatenation.
pub fn validate_endpoint(url: &str) -> Result<String, CoreError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Server endpoint must not be empty".to_string(),
        ));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(CoreError::Validation(format!(
            "Server endpoint must start with http:// or https://, got: '{trimmed}'"
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Convert a poll interval in seconds into a [`Duration`].
///
/// Accepts values in `(0, MAX_POLL_INTERVAL_SECS]`.
pub fn validate_poll_interval(secs: f64) -> Result<Duration, CoreError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(CoreError::Validation(format!(
            "Poll interval must be a positive number of seconds, got {secs}"
        )));
    }
    if secs > MAX_POLL_INTERVAL_SECS {
        return Err(CoreError::Validation(format!(
            "Poll interval must be at most {MAX_POLL_INTERVAL_SECS} seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| CoreError::Validation(format!("Invalid poll interval {secs}: {e}")))
}

/// Validate that the input image exists and is a regular, readable file.
pub fn validate_input_image(path: &Path) -> Result<(), CoreError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        CoreError::Validation(format!("Image file not readable: {}: {e}", path.display()))
    })?;
    if !metadata.is_file() {
        return Err(CoreError::Validation(format!(
            "Image path is not a file: {}",
            path.display()
        )));
    }
    std::fs::File::open(path).map_err(|e| {
        CoreError::Validation(format!("Image file not readable: {}: {e}", path.display()))
    })?;
    Ok(())
}

/// Derive the output path used when the caller does not provide one:
/// `<image dir>/<image stem>_hunyuan3d.usd`.
pub fn default_output_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    let file_name = format!("{stem}{OUTPUT_SUFFIX}.{OUTPUT_EXTENSION}");
    match image_path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
