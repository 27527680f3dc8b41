//! Human review as a job.
//!
//! Submitting stages the input document where the review editor can load
//! it and opens a ticket so someone picks it up. The editor saves the
//! corrected document next to the staged one with a `.complete` suffix,
//! which is what [`Job::check`] waits for.
//!
//! The ticket record lives in the caller-owned `task_json` file; nothing
//! else about the review is remembered between invocations. Creating the
//! staged document is the claim on the fingerprint, so two invocations
//! racing to submit the same review open one ticket.

use amp_job::{artifact, Job, JobError, JobFingerprint, JobRequest, JobStatus, RunResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use types::{ReviewContext, TaskRecord, TaskType};

mod error;
mod tracker;

pub use error::HmgmError;
pub use tracker::{NewTask, RestTracker, TaskTracker, TrackerConfig};

pub const TAG: &str = "hmgm";

pub const COMPLETE_SUFFIX: &str = ".complete";

pub const TASK_JSON_PARAM: &str = "task_json";
pub const TASK_TYPE_PARAM: &str = "task_type";
pub const CONTEXT_JSON_PARAM: &str = "context_json";

const fn default_stale_after_secs() -> u64 {
    3600
}

/// The `hmgm` configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct HmgmConfig {
    /// Directory the review editor reads from and writes to
    pub editor_dir: PathBuf,
    pub tracker: TrackerConfig,

    /// A staged document without a ticket older than this is treated as an
    /// abandoned submission and replaced.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

pub struct HmgmJob {
    fingerprint: JobFingerprint,
    tracker: Arc<dyn TaskTracker>,
    task_type: TaskType,
    context: ReviewContext,
    input: PathBuf,
    output: PathBuf,
    task_json: PathBuf,
    staged: PathBuf,
    stale_after: Duration,
}

async fn create_new(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

/// `<path>.complete`, where the editor saves the reviewed document.
pub fn complete_path(staged: &Path) -> PathBuf {
    let mut path = staged.as_os_str().to_owned();
    path.push(COMPLETE_SUFFIX);
    PathBuf::from(path)
}

impl HmgmJob {
    /// # Errors
    /// If a required parameter is missing or malformed.
    pub fn new(
        config: &HmgmConfig,
        tracker: Arc<dyn TaskTracker>,
        request: &JobRequest,
    ) -> Result<Self, JobError> {
        let task_type = request
            .require_param(TASK_TYPE_PARAM)?
            .parse::<TaskType>()
            .map_err(|reason| JobError::invalid_parameter(TASK_TYPE_PARAM, reason))?;

        let context_json = request.require_param(CONTEXT_JSON_PARAM)?;
        let context = serde_json::from_str::<ReviewContext>(context_json)
            .map_err(|err| JobError::invalid_parameter(CONTEXT_JSON_PARAM, err.to_string()))?
            .desanitized();

        let fingerprint = request.fingerprint()?;

        Ok(Self {
            staged: config.editor_dir.join(format!("{fingerprint}.json")),
            fingerprint,
            tracker,
            task_type,
            context,
            input: request.primary_input()?.to_path_buf(),
            output: request.primary_output()?.to_path_buf(),
            task_json: PathBuf::from(request.require_param(TASK_JSON_PARAM)?),
            stale_after: Duration::from_secs(config.stale_after_secs),
        })
    }

    /// The document the editor opens.
    pub fn staged_path(&self) -> &Path {
        &self.staged
    }

    async fn read_record(&self) -> Result<Option<TaskRecord>, HmgmError> {
        if !artifact::is_produced(&self.task_json).await {
            return Ok(None);
        }

        let contents = fs::read(&self.task_json).await?;
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    async fn write_record(&self, record: &TaskRecord) -> Result<(), HmgmError> {
        artifact::write_atomically(&self.task_json, serde_json::to_vec_pretty(record)?).await?;
        Ok(())
    }

    /// Claim the fingerprint by creating the staged document.
    ///
    /// Returns `None` if another invocation holds the claim.
    async fn claim(&self) -> Result<Option<fs::File>, HmgmError> {
        match create_new(&self.staged).await {
            Ok(file) => return Ok(Some(file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err.into()),
        }

        if self.read_record().await?.is_some() {
            tracing::warn!(
                "review {} was already submitted by another invocation",
                self.fingerprint
            );
            return Ok(None);
        }

        let age = fs::metadata(&self.staged)
            .await?
            .modified()?
            .elapsed()
            .unwrap_or_default();
        if age < self.stale_after {
            tracing::info!(
                "review {} is being submitted by another invocation",
                self.fingerprint
            );
            return Ok(None);
        }

        tracing::warn!(
            "replacing abandoned submission {} ({:?} old)",
            self.staged.display(),
            age
        );
        fs::remove_file(&self.staged).await?;
        Ok(Some(create_new(&self.staged).await?))
    }

    async fn stage(
        &self,
        mut staged: fs::File,
        document: &[u8],
    ) -> Result<TaskRecord, HmgmError> {
        staged.write_all(document).await?;
        staged.flush().await?;
        drop(staged);

        self.open_ticket().await
    }

    /// Open the ticket for an already staged document.
    async fn open_ticket(&self) -> Result<TaskRecord, HmgmError> {
        let task = NewTask {
            task_type: self.task_type,
            context: self.context.clone(),
            editor_input: self.staged.clone(),
            external_id: self.fingerprint.to_string(),
        };

        let record = self.tracker.create_task(&task).await?;
        self.write_record(&record).await?;
        Ok(record)
    }

    async fn remove_staged(&self) -> Result<(), HmgmError> {
        artifact::remove_if_exists(&self.staged).await?;
        artifact::remove_if_exists(&complete_path(&self.staged)).await?;
        Ok(())
    }

    async fn close_ticket(&self, record: &TaskRecord) {
        match self.tracker.close_task(record).await {
            Ok(()) => tracing::info!("closed ticket {}", record.key),
            Err(err) => tracing::warn!("failed to close ticket {}: {}", record.key, err),
        }
    }
}

#[async_trait]
impl Job for HmgmJob {
    fn fingerprint(&self) -> &JobFingerprint {
        &self.fingerprint
    }

    async fn exists(&self) -> Result<JobStatus, JobError> {
        Ok(match self.read_record().await? {
            None => JobStatus::Absent,
            Some(record) if record.is_closed() => JobStatus::Complete,
            Some(_) => JobStatus::InProgress,
        })
    }

    async fn submit(&self) -> Result<RunResult, JobError> {
        let contents = fs::read(&self.input).await?;
        let document: serde_json::Value = serde_json::from_slice(&contents)?;

        if !self.task_type.has_reviewable_data(&document) {
            tracing::info!(
                "{} has no {} data to review, passing it through",
                self.input.display(),
                self.task_type
            );
            artifact::copy_atomically(&self.input, &self.output).await?;
            return Ok(RunResult::Ok);
        }

        let Some(staged) = self.claim().await? else {
            return Ok(RunResult::Wait);
        };

        match self.stage(staged, &contents).await {
            Ok(record) => {
                tracing::info!(
                    "opened {} review ticket {}: {}",
                    self.task_type,
                    record.key,
                    record.url
                );
                Ok(RunResult::Wait)
            }
            Err(err) => {
                tracing::error!("failed to open review ticket: {}", err);
                if let Err(rollback_err) = artifact::remove_if_exists(&self.staged).await {
                    tracing::warn!(
                        "failed to remove {}: {}",
                        self.staged.display(),
                        rollback_err
                    );
                }
                Ok(RunResult::Error)
            }
        }
    }

    async fn check(&self) -> Result<RunResult, JobError> {
        let Some(mut record) = self.read_record().await? else {
            // a staged document without a ticket is another invocation's claim
            if fs::try_exists(&self.staged).await? {
                tracing::debug!("review {} is still being submitted", self.fingerprint);
                return Ok(RunResult::Wait);
            }
            return Err(JobError::Vanished(self.fingerprint.to_string()));
        };

        if record.is_closed() {
            return Ok(if artifact::is_produced(&self.output).await {
                RunResult::Ok
            } else {
                tracing::error!(
                    "ticket {} is closed but no reviewed output exists",
                    record.key
                );
                RunResult::Error
            });
        }

        let complete = complete_path(&self.staged);
        if !fs::try_exists(&complete).await? {
            tracing::debug!("waiting for {} to be reviewed", record.key);
            return Ok(RunResult::Wait);
        }

        artifact::copy_atomically(&complete, &self.output).await?;
        self.close_ticket(&record).await;

        record.closed_at = Some(Utc::now());
        self.write_record(&record).await?;
        self.remove_staged().await?;

        tracing::info!("review {} is complete", record.key);
        Ok(RunResult::Ok)
    }

    async fn cleanup(&self) -> Result<(), JobError> {
        self.remove_staged().await?;

        if let Some(record) = self.read_record().await? {
            if !record.is_closed() {
                self.close_ticket(&record).await;
            }
            // task_json belongs to the caller, so it is emptied rather than removed
            fs::File::create(&self.task_json).await?;
        }

        Ok(())
    }
}
