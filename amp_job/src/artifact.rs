//! Filesystem conventions shared with the workflow engine.
//!
//! The engine creates every output as an empty file before a step starts,
//! so a file only counts as produced when it is non-empty. A failed step
//! leaves `<output>.err` next to its output so downstream steps fail
//! instead of waiting forever.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use types::RunResult;

use crate::JobError;

pub const ERR_SUFFIX: &str = ".err";

const PARTIAL_SUFFIX: &str = ".partial";

pub fn error_marker(path: &Path) -> PathBuf {
    let mut marker = path.as_os_str().to_owned();
    marker.push(ERR_SUFFIX);
    PathBuf::from(marker)
}

/// True only if `path` is a regular, non-empty file.
pub async fn is_produced(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Not produced yet; the upstream step may still be running.
    Pending,
    Failed(String),
}

/// Decide whether an input can be consumed.
///
/// An error marker always fails. A missing or empty input fails unless
/// `wait_for_upstream` is set, in which case it is pending.
pub async fn check_input(path: &Path, wait_for_upstream: bool) -> Readiness {
    if fs::try_exists(error_marker(path)).await.unwrap_or(false) {
        return Readiness::Failed(format!(
            "{} is in error, the step producing it must have failed",
            path.display()
        ));
    }

    if is_produced(path).await {
        Readiness::Ready
    } else if wait_for_upstream {
        Readiness::Pending
    } else {
        Readiness::Failed(format!(
            "{} doesn't exist or is empty",
            path.display()
        ))
    }
}

/// Empty a failed output and drop an error marker next to it.
///
/// # Errors
/// If the output or its marker cannot be written.
pub async fn mark_failed(output: &Path) -> std::io::Result<()> {
    if is_produced(output).await {
        fs::File::create(output).await?;
        tracing::debug!("emptied {}", output.display());
    }

    fs::File::create(error_marker(output)).await?;
    tracing::debug!("created error marker for {}", output.display());

    Ok(())
}

/// Remove a marker left by an earlier failed run.
///
/// # Errors
/// If the marker exists but cannot be removed.
pub async fn clear_error_marker(output: &Path) -> std::io::Result<()> {
    if remove_if_exists(&error_marker(output)).await? {
        tracing::debug!("removed stale error marker for {}", output.display());
    }
    Ok(())
}

/// Remove a file, treating "already gone" as success.
///
/// Returns whether a file was removed.
///
/// # Errors
/// For any failure other than the file not existing.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Sibling path used while an output is being written.
pub fn partial_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    path.with_file_name(format!(".{file_name}{PARTIAL_SUFFIX}"))
}

/// Write `contents` so that `path` is never observed half-written.
///
/// # Errors
/// If the temporary file cannot be written or renamed.
pub async fn write_atomically(
    path: &Path,
    contents: impl AsRef<[u8]>,
) -> std::io::Result<()> {
    let partial = partial_path(path);
    fs::write(&partial, contents).await?;
    fs::rename(&partial, path).await
}

/// Copy `source` to `destination` through a temporary sibling file.
///
/// # Errors
/// If the source cannot be read or the destination cannot be written.
pub async fn copy_atomically(
    source: &Path,
    destination: &Path,
) -> std::io::Result<u64> {
    let partial = partial_path(destination);
    let copied = fs::copy(source, &partial).await?;
    fs::rename(&partial, destination).await?;
    Ok(copied)
}

/// The caller-declared inputs and outputs of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    /// Treat missing or empty inputs as "upstream still running"
    pub wait_for_inputs: bool,
}

impl ArtifactSet {
    pub fn new(inputs: Vec<PathBuf>, outputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            outputs,
            wait_for_inputs: false,
        }
    }

    #[must_use]
    pub const fn waiting_for_inputs(mut self, wait: bool) -> Self {
        self.wait_for_inputs = wait;
        self
    }

    /// Clear stale error markers and check the inputs.
    ///
    /// Returns `None` when the job may proceed, otherwise the result to
    /// report without touching the backend.
    ///
    /// # Errors
    /// If a stale marker cannot be removed.
    pub async fn preflight(&self) -> Result<Option<RunResult>, JobError> {
        for output in &self.outputs {
            clear_error_marker(output).await?;
        }

        for input in &self.inputs {
            match check_input(input, self.wait_for_inputs).await {
                Readiness::Ready => {}
                Readiness::Pending => {
                    tracing::info!(
                        "input {} has not been produced yet",
                        input.display()
                    );
                    return Ok(Some(RunResult::Wait));
                }
                Readiness::Failed(reason) => {
                    tracing::error!("precondition failed: {}", reason);
                    return Ok(Some(RunResult::Error));
                }
            }
        }

        Ok(None)
    }

    /// Outputs that are still missing or empty.
    pub async fn missing_outputs(&self) -> Vec<&Path> {
        let mut missing = Vec::new();
        for output in &self.outputs {
            if !is_produced(output).await {
                missing.push(output.as_path());
            }
        }
        missing
    }

    /// Mark every output as failed, logging (not propagating) I/O errors.
    pub async fn mark_failed(&self) {
        for output in &self.outputs {
            if let Err(err) = mark_failed(output).await {
                tracing::warn!(
                    "failed to mark {} as failed: {}",
                    output.display(),
                    err
                );
            }
        }
    }
}
