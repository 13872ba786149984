use std::path::PathBuf;
use std::time::Duration;

use hunyuan3d_core::generation::{
    validate_endpoint, validate_poll_interval, DEFAULT_BASE_URL, DEFAULT_POLL_INTERVAL_SECS,
};

/// Default scheduler tick.
pub const DEFAULT_TICK_MS: u64 = 100;
/// Default global task timeout, measured from submission.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 1800;
/// Default time a finished task stays queryable.
pub const DEFAULT_RETENTION_SECS: u64 = 300;
/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Default external conversion program.
pub const DEFAULT_CONVERTER: &str = "asset-converter";
/// Default conversion timeout.
pub const DEFAULT_CONVERTER_TIMEOUT_SECS: u64 = 600;

/// Task manager configuration.
///
/// All fields have defaults suitable for a local Hunyuan3D server.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Endpoint used when a request does not name one.
    pub default_endpoint: String,
    /// Poll interval used when a request does not name one.
    pub default_poll_interval: Duration,
    /// How often the scheduler loop wakes up on its own.
    pub tick_interval: Duration,
    /// Global timeout; `None` disables it.
    pub task_timeout: Option<Duration>,
    /// How long terminal records stay queryable before eviction.
    pub retention: Duration,
    /// Parent directory of the per-task scratch directories.
    pub temp_root: PathBuf,
    /// HTTP request timeout for the remote client.
    pub request_timeout: Duration,
    /// External conversion program.
    pub converter_program: PathBuf,
    /// Conversion timeout.
    pub converter_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_endpoint: DEFAULT_BASE_URL.to_string(),
            default_poll_interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            task_timeout: Some(Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS)),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            temp_root: std::env::temp_dir(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            converter_program: PathBuf::from(DEFAULT_CONVERTER),
            converter_timeout: Duration::from_secs(DEFAULT_CONVERTER_TIMEOUT_SECS),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default                 |
    /// |------------------------------------|-------------------------|
    /// | `HUNYUAN3D_BASE_URL`               | `http://localhost:8081` |
    /// | `HUNYUAN3D_POLL_INTERVAL_SECS`     | `2.0`                   |
    /// | `HUNYUAN3D_TICK_MS`                | `100`                   |
    /// | `HUNYUAN3D_TASK_TIMEOUT_SECS`      | `1800` (`0` disables)   |
    /// | `HUNYUAN3D_RETENTION_SECS`         | `300`                   |
    /// | `HUNYUAN3D_TEMP_DIR`               | OS temp dir             |
    /// | `HUNYUAN3D_REQUEST_TIMEOUT_SECS`   | `30`                    |
    /// | `HUNYUAN3D_CONVERTER`              | `asset-converter`       |
    /// | `HUNYUAN3D_CONVERTER_TIMEOUT_SECS` | `600`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("HUNYUAN3D_BASE_URL") {
            config.default_endpoint = validate_endpoint(&raw)
                .map_err(|e| ConfigError::invalid("HUNYUAN3D_BASE_URL", e))?;
        }
        if let Some(raw) = lookup("HUNYUAN3D_POLL_INTERVAL_SECS") {
            let secs: f64 = parse("HUNYUAN3D_POLL_INTERVAL_SECS", &raw)?;
            config.default_poll_interval = validate_poll_interval(secs)
                .map_err(|e| ConfigError::invalid("HUNYUAN3D_POLL_INTERVAL_SECS", e))?;
        }
        if let Some(raw) = lookup("HUNYUAN3D_TICK_MS") {
            let ms: u64 = parse("HUNYUAN3D_TICK_MS", &raw)?;
            if ms == 0 {
                return Err(ConfigError::invalid("HUNYUAN3D_TICK_MS", "must be positive"));
            }
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("HUNYUAN3D_TASK_TIMEOUT_SECS") {
            let secs: u64 = parse("HUNYUAN3D_TASK_TIMEOUT_SECS", &raw)?;
            config.task_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(raw) = lookup("HUNYUAN3D_RETENTION_SECS") {
            config.retention = Duration::from_secs(parse("HUNYUAN3D_RETENTION_SECS", &raw)?);
        }
        if let Some(raw) = lookup("HUNYUAN3D_TEMP_DIR") {
            if raw.trim().is_empty() {
                return Err(ConfigError::invalid("HUNYUAN3D_TEMP_DIR", "must not be empty"));
            }
            config.temp_root = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("HUNYUAN3D_REQUEST_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse("HUNYUAN3D_REQUEST_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = lookup("HUNYUAN3D_CONVERTER") {
            if raw.trim().is_empty() {
                return Err(ConfigError::invalid("HUNYUAN3D_CONVERTER", "must not be empty"));
            }
            config.converter_program = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("HUNYUAN3D_CONVERTER_TIMEOUT_SECS") {
            config.converter_timeout =
                Duration::from_secs(parse("HUNYUAN3D_CONVERTER_TIMEOUT_SECS", &raw)?);
        }

        Ok(config)
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(var, e))
}

/// A configuration variable held an unusable value.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl std::fmt::Display) -> Self {
        Self {
            var,
            reason: reason.to_string(),
        }
    }
}
