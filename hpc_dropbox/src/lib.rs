//! Jobs for an HPC cluster that only shares a filesystem with us.
//!
//! Each job is a directory named after its fingerprint inside the dropbox:
//!
//! ```text
//! <dropbox>/<fingerprint>/
//!     inputs/       staged copies of the caller's inputs
//!     outputs/      written by the cluster
//!     job.json      the request, written last; its presence means "submitted"
//!     status.json   written by the cluster: pending, running, ok or error
//! ```
//!
//! Creating the directory is the atomic claim on the fingerprint, so two
//! invocations racing to submit the same job stage it only once.

use amp_job::{artifact, Job, JobError, JobFingerprint, JobRequest, JobStatus, RunResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use types::{HpcJobRequest, HpcJobState, HpcJobStatus};

mod error;

pub use error::DropboxError;

pub const TAG: &str = "hpc-dropbox";

pub const SCRIPT_PARAM: &str = "script";
pub const TIMESTAMPS_PARAM: &str = "timestamps_output";

pub const JOB_FILE: &str = "job.json";
pub const STATUS_FILE: &str = "status.json";
pub const INPUTS_DIR: &str = "inputs";
pub const OUTPUTS_DIR: &str = "outputs";

const fn default_stale_after_secs() -> u64 {
    3600
}

/// The `hpc_dropbox` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DropboxConfig {
    /// Directory shared with the cluster
    pub dropbox_dir: PathBuf,

    /// Cluster-side script used when the request doesn't name one
    #[serde(default)]
    pub script: Option<String>,

    /// A job directory without `job.json` older than this is treated as
    /// an abandoned submission and replaced.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

pub struct DropboxJob {
    fingerprint: JobFingerprint,
    job_dir: PathBuf,
    dropbox_dir: PathBuf,
    script: String,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
    params: BTreeMap<String, String>,
    timestamps_output: Option<PathBuf>,
    stale_after: Duration,
}

/// Name under which the artifact at `index` is staged.
///
/// The index keeps inputs with equal file names apart.
pub fn staged_name(index: usize, path: &Path) -> String {
    let file_name = path
        .file_name()
        .map_or_else(|| "artifact".to_string(), |name| name.to_string_lossy().into_owned());

    format!("{index:02}-{file_name}")
}

impl DropboxJob {
    /// # Errors
    /// If no script is configured or requested, or no output is declared.
    pub fn new(config: &DropboxConfig, request: &JobRequest) -> Result<Self, JobError> {
        let script = request
            .param(SCRIPT_PARAM)
            .or(config.script.as_deref())
            .ok_or_else(|| JobError::MissingParameter(SCRIPT_PARAM.to_string()))?
            .to_string();

        request.primary_output()?;

        let fingerprint = request.fingerprint()?;
        let params = request
            .params()
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), SCRIPT_PARAM | TIMESTAMPS_PARAM))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            job_dir: config.dropbox_dir.join(fingerprint.as_str()),
            dropbox_dir: config.dropbox_dir.clone(),
            fingerprint,
            script,
            inputs: request.inputs().to_vec(),
            outputs: request.outputs().to_vec(),
            params,
            timestamps_output: request.param(TIMESTAMPS_PARAM).map(PathBuf::from),
            stale_after: Duration::from_secs(config.stale_after_secs),
        })
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    fn job_file(&self) -> PathBuf {
        self.job_dir.join(JOB_FILE)
    }

    async fn is_submitted(&self) -> Result<bool, DropboxError> {
        Ok(fs::try_exists(self.job_file()).await?)
    }

    /// The cluster's status document; `None` until the cluster writes one.
    async fn read_state(&self) -> Result<Option<HpcJobState>, DropboxError> {
        let path = self.job_dir.join(STATUS_FILE);
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if contents.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|source| DropboxError::Document { path, source })
    }

    async fn read_request(&self) -> Result<HpcJobRequest, DropboxError> {
        let path = self.job_file();
        let contents = fs::read(&path).await?;
        let request: HpcJobRequest = serde_json::from_slice(&contents)
            .map_err(|source| DropboxError::Document { path, source })?;

        request.validate().map_err(DropboxError::Invalid)?;
        Ok(request)
    }

    /// Claim the job directory.
    ///
    /// Returns `false` if another invocation holds the claim.
    async fn claim(&self) -> Result<bool, DropboxError> {
        match fs::create_dir(&self.job_dir).await {
            Ok(()) => return Ok(true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err.into()),
        }

        if self.is_submitted().await? {
            tracing::warn!("job {} was already submitted by another invocation", self.fingerprint);
            return Ok(false);
        }

        let age = fs::metadata(&self.job_dir)
            .await?
            .modified()?
            .elapsed()
            .unwrap_or_default();
        if age < self.stale_after {
            tracing::info!("job {} is being staged by another invocation", self.fingerprint);
            return Ok(false);
        }

        tracing::warn!(
            "replacing abandoned submission in {} ({:?} old)",
            self.job_dir.display(),
            age
        );
        fs::remove_dir_all(&self.job_dir).await?;
        fs::create_dir(&self.job_dir).await?;
        Ok(true)
    }

    async fn stage(&self) -> Result<(), DropboxError> {
        let inputs_dir = self.job_dir.join(INPUTS_DIR);
        fs::create_dir(&inputs_dir).await?;
        fs::create_dir(self.job_dir.join(OUTPUTS_DIR)).await?;

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            let name = staged_name(index, input);
            let copied = fs::copy(input, inputs_dir.join(&name)).await?;
            tracing::debug!("staged {} ({} bytes) as {}", input.display(), copied, name);
            inputs.push(name);
        }

        let request = HpcJobRequest {
            script: self.script.clone(),
            inputs,
            outputs: self
                .outputs
                .iter()
                .enumerate()
                .map(|(index, output)| staged_name(index, output))
                .collect(),
            params: self.params.clone(),
            submitted_at: Utc::now(),
        };
        request.validate().map_err(DropboxError::Invalid)?;

        let contents = serde_json::to_vec_pretty(&request)?;
        artifact::write_atomically(&self.job_file(), contents).await?;
        Ok(())
    }

    async fn collect(
        &self,
        request: &HpcJobRequest,
        state: &HpcJobState,
    ) -> Result<RunResult, DropboxError> {
        if request.outputs.len() != self.outputs.len() {
            return Err(DropboxError::Invalid(format!(
                "job document lists {} outputs, {} were requested",
                request.outputs.len(),
                self.outputs.len()
            )));
        }

        let outputs_dir = self.job_dir.join(OUTPUTS_DIR);
        for (name, destination) in request.outputs.iter().zip(&self.outputs) {
            let source = outputs_dir.join(name);
            if !artifact::is_produced(&source).await {
                tracing::error!(
                    "cluster reported success but {} is missing or empty",
                    source.display()
                );
                return Ok(RunResult::Error);
            }

            artifact::copy_atomically(&source, destination).await?;
            tracing::debug!("copied {} to {}", name, destination.display());
        }

        if let Some(path) = &self.timestamps_output {
            match state.timestamps() {
                Some(timestamps) => {
                    artifact::write_atomically(path, serde_json::to_vec_pretty(&timestamps)?)
                        .await?;
                }
                None => tracing::warn!("cluster did not record start and end times"),
            }
        }

        Ok(RunResult::Ok)
    }
}

#[async_trait]
impl Job for DropboxJob {
    fn fingerprint(&self) -> &JobFingerprint {
        &self.fingerprint
    }

    async fn exists(&self) -> Result<JobStatus, JobError> {
        if !self.is_submitted().await? {
            return Ok(JobStatus::Absent);
        }

        let status = self.read_state().await?.map(|state| state.status);
        Ok(match status {
            None | Some(HpcJobStatus::Pending | HpcJobStatus::Running) => JobStatus::InProgress,
            Some(HpcJobStatus::Ok) => JobStatus::Complete,
            Some(HpcJobStatus::Error) => JobStatus::Failed,
        })
    }

    async fn submit(&self) -> Result<RunResult, JobError> {
        if !fs::try_exists(&self.dropbox_dir).await? {
            return Err(DropboxError::MissingDropbox(self.dropbox_dir.clone()).into());
        }

        if !self.claim().await? {
            return Ok(RunResult::Wait);
        }

        match self.stage().await {
            Ok(()) => {
                tracing::info!(
                    "submitted {} job in {}",
                    self.script,
                    self.job_dir.display()
                );
                Ok(RunResult::Wait)
            }
            Err(err) => {
                tracing::error!("failed to stage job: {}", err);
                if let Err(rollback_err) = fs::remove_dir_all(&self.job_dir).await {
                    tracing::warn!(
                        "failed to remove {}: {}",
                        self.job_dir.display(),
                        rollback_err
                    );
                }
                Ok(RunResult::Error)
            }
        }
    }

    async fn check(&self) -> Result<RunResult, JobError> {
        if !self.is_submitted().await? {
            // the directory without `job.json` is another invocation's claim
            if fs::try_exists(&self.job_dir).await? {
                tracing::debug!("job {} is still being staged", self.fingerprint);
                return Ok(RunResult::Wait);
            }
            return Err(JobError::Vanished(self.fingerprint.to_string()));
        }

        let Some(state) = self.read_state().await? else {
            tracing::debug!("cluster has not picked up the job yet");
            return Ok(RunResult::Wait);
        };

        match state.status {
            HpcJobStatus::Pending | HpcJobStatus::Running => {
                tracing::debug!("cluster job is {:?}", state.status);
                Ok(RunResult::Wait)
            }
            HpcJobStatus::Error => {
                tracing::error!(
                    "cluster job failed: {}",
                    state.message.as_deref().unwrap_or("no message")
                );
                Ok(RunResult::Error)
            }
            HpcJobStatus::Ok => {
                let request = self.read_request().await?;
                Ok(self.collect(&request, &state).await?)
            }
        }
    }

    async fn cleanup(&self) -> Result<(), JobError> {
        match fs::remove_dir_all(&self.job_dir).await {
            Ok(()) => {
                tracing::info!("removed {}", self.job_dir.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_staged_name() {
        assert_eq!(staged_name(0, Path::new("/media/in.wav")), "00-in.wav");
        assert_eq!(staged_name(12, Path::new("out.json")), "12-out.json");
        assert_eq!(staged_name(1, Path::new("/")), "01-artifact");
    }

    #[test]
    fn test_script_comes_from_param_or_config() {
        let config = DropboxConfig {
            dropbox_dir: PathBuf::from("/dropbox"),
            script: Some("whisper".to_string()),
            stale_after_secs: default_stale_after_secs(),
        };
        let request = JobRequest::new(TAG, vec!["/in.wav".into()], vec!["/out.json".into()]);

        let job = DropboxJob::new(&config, &request).unwrap();
        assert_eq!(job.script, "whisper");
        assert_eq!(
            job.job_dir(),
            Path::new("/dropbox").join(job.fingerprint.as_str())
        );

        let job = DropboxJob::new(
            &config,
            &request
                .clone()
                .with_param(SCRIPT_PARAM, "kaldi")
                .with_param(TIMESTAMPS_PARAM, "/ts.json")
                .with_param("model", "medium"),
        )
        .unwrap();
        assert_eq!(job.script, "kaldi");
        assert_eq!(job.timestamps_output, Some(PathBuf::from("/ts.json")));
        assert_eq!(
            job.params,
            BTreeMap::from([("model".to_string(), "medium".to_string())])
        );

        let unscripted = DropboxConfig {
            script: None,
            ..config
        };
        assert!(matches!(
            DropboxJob::new(&unscripted, &request),
            Err(JobError::MissingParameter(_))
        ));
    }
}
