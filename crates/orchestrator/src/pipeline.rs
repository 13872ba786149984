//! Fetch-then-convert sequence for a finished remote job.
//!
//! Runs inside a scheduler worker once a task has entered `Fetching`. The
//! returned outcome is settled by the caller, which also removes the task's
//! scratch directory before the terminal state is published.

use std::path::PathBuf;

use hunyuan3d_core::task::{TaskError, TaskOutcome, TaskState};
use hunyuan3d_core::types::TaskId;

use crate::record::TaskParams;
use crate::scheduler::Shared;

/// Download the asset, stage it in a private scratch directory, and convert
/// it to the requested output path.
pub(crate) async fn fetch_and_convert(
    shared: &Shared,
    id: TaskId,
    params: &TaskParams,
    remote_job_id: &str,
) -> TaskOutcome {
    let bytes = match shared.client.fetch(&params.endpoint, remote_job_id).await {
        Ok(bytes) => bytes,
        Err(e) => return failed(TaskError::Fetch(e.to_string())),
    };
    tracing::debug!(task_id = %id, bytes = bytes.len(), "Model downloaded");

    let asset_path = match stage_asset(shared, id, remote_job_id, &bytes).await {
        Ok(path) => path,
        Err(e) => return failed(TaskError::Fetch(e)),
    };

    if let Some(outcome) = shared.registry.safe_point(id) {
        return outcome;
    }
    if !shared.registry.transition(id, TaskState::Converting, |_| {}) {
        return failed(TaskError::Internal(
            "Task left the fetch stage unexpectedly".into(),
        ));
    }

    let output = &params.output_path;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return failed(TaskError::Conversion(format!(
                "Cannot create output directory {}: {e}",
                parent.display()
            )));
        }
    }

    match shared.converter.convert(&asset_path, output).await {
        Ok(()) => TaskOutcome::Completed {
            output_path: output.clone(),
        },
        Err(e) => failed(TaskError::Conversion(e.to_string())),
    }
}

/// Write the downloaded bytes to `<scratch dir>/<remote id>.glb`.
async fn stage_asset(
    shared: &Shared,
    id: TaskId,
    remote_job_id: &str,
    bytes: &[u8],
) -> Result<PathBuf, String> {
    let root = &shared.config.temp_root;
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| format!("Cannot create temp root {}: {e}", root.display()))?;

    let dir = tempfile::Builder::new()
        .prefix("hunyuan3d-")
        .tempdir_in(root)
        .map_err(|e| format!("Cannot create scratch directory: {e}"))?;
    let asset_path = dir.path().join(asset_file_name(remote_job_id));
    shared.registry.attach_workdir(id, dir);

    tokio::fs::write(&asset_path, bytes)
        .await
        .map_err(|e| format!("Cannot write {}: {e}", asset_path.display()))?;
    Ok(asset_path)
}

/// Remote ids come from the server; keep only filename-safe characters.
fn asset_file_name(remote_job_id: &str) -> String {
    let safe: String = remote_job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.glb")
}

fn failed(error: TaskError) -> TaskOutcome {
    TaskOutcome::Failed { error }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_name_uses_remote_id() {
        assert_eq!(
            asset_file_name("0b7c9e1a-77aa-4c1e-9b3e-1f2d3c4b5a69"),
            "0b7c9e1a-77aa-4c1e-9b3e-1f2d3c4b5a69.glb"
        );
    }

    #[test]
    fn asset_name_strips_path_separators() {
        assert_eq!(asset_file_name("../etc/passwd"), "___etc_passwd.glb");
    }
}
