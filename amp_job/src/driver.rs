//! The state machine that sequences [`Job`] operations.
//!
//! ```text
//! START ─┬─ exists() present ──> RESUMED ──┐
//!        └─ submit() == WAIT ──> SUBMITTED ┴─> POLLING ─┬─> DONE ───┬─> CLEANED
//!                                                       └─> FAILED ─┘
//! ```
//!
//! In cooperative mode one backend operation runs per invocation and the
//! result goes straight back to the scheduler. In synchronous mode the
//! driver keeps polling until the job reaches a terminal result.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::Instrument;
use types::RunResult;

use crate::{ArtifactSet, Job, JobError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// A single submit or check per invocation; the scheduler re-invokes
    /// on WAIT.
    Cooperative,
    /// Poll in-process until the job finishes.
    #[default]
    Synchronous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    pub mode: Mode,
    /// Discard any existing job for the fingerprint before starting.
    pub force: bool,
    pub poll_interval: Duration,
    /// Give up on a synchronous run that has been polling this long.
    pub timeout: Option<Duration>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            force: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Start,
    Submitted,
    Resumed,
    Polling,
    Done,
    Failed,
    Cleaned,
}

pub struct Driver<'a> {
    job: &'a dyn Job,
    options: DriverOptions,
    artifacts: Option<ArtifactSet>,
    state: DriverState,
}

impl<'a> Driver<'a> {
    pub fn new(job: &'a dyn Job, options: DriverOptions) -> Self {
        Self {
            job,
            options,
            artifacts: None,
            state: DriverState::Start,
        }
    }

    /// Check inputs before and verify outputs after the job runs.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: ArtifactSet) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub const fn state(&self) -> DriverState {
        self.state
    }

    /// Drive the job as far as the mode allows.
    ///
    /// Never fails: every error is logged, followed by a best-effort
    /// cleanup, and reported as [`RunResult::Error`].
    pub async fn run(&mut self) -> RunResult {
        let span = tracing::info_span!(
            "job",
            fingerprint = %self.job.fingerprint()
        );

        async {
            let result = self.run_checked().await;
            tracing::info!("job finished: {}", result);
            result
        }
        .instrument(span)
        .await
    }

    async fn run_checked(&mut self) -> RunResult {
        let artifacts = self.artifacts.clone();

        if let Some(artifacts) = &artifacts {
            let verdict = match artifacts.preflight().await {
                Ok(verdict) => verdict,
                Err(err) => {
                    tracing::error!("failed to prepare artifacts: {}", err);
                    Some(RunResult::Error)
                }
            };

            match verdict {
                None => {}
                Some(RunResult::Error) => {
                    self.transition(DriverState::Failed);
                    artifacts.mark_failed().await;
                    return RunResult::Error;
                }
                Some(result) => return result,
            }
        }

        let mut result = self.drive().await;

        if let Some(artifacts) = &artifacts {
            if result == RunResult::Ok {
                let missing = artifacts.missing_outputs().await;
                if !missing.is_empty() {
                    tracing::error!(
                        "job reported success but outputs were not produced: {:?}",
                        missing
                    );
                    self.state = DriverState::Failed;
                    result = RunResult::Error;
                }
            }

            if result == RunResult::Error {
                artifacts.mark_failed().await;
            }
        }

        result
    }

    async fn drive(&mut self) -> RunResult {
        match self.advance().await {
            Ok(result) => self.finish(result).await,
            Err(err) => {
                tracing::error!("job {} failed: {}", self.job.fingerprint(), err);
                self.transition(DriverState::Failed);
                self.cleanup().await;
                RunResult::Error
            }
        }
    }

    /// Run backend operations until the mode says to stop.
    async fn advance(&mut self) -> Result<RunResult, JobError> {
        if self.options.force {
            tracing::info!("force requested, discarding any existing job");
            self.job.cleanup().await?;
        }

        let status = self.job.exists().await?;
        let mut result = if status.is_present() {
            tracing::info!("found existing job ({})", status);
            self.transition(DriverState::Resumed);
            self.poll().await?
        } else {
            tracing::info!("submitting job {}", self.job.fingerprint());
            let submitted = self.job.submit().await?;
            self.transition(match submitted {
                RunResult::Wait => DriverState::Submitted,
                RunResult::Ok => DriverState::Done,
                RunResult::Error => DriverState::Failed,
            });
            submitted
        };

        if self.options.mode == Mode::Cooperative {
            return Ok(result);
        }

        // a fresh submission has not been polled yet
        if self.state == DriverState::Submitted {
            result = self.poll().await?;
        }

        let started = Instant::now();
        while result == RunResult::Wait {
            if let Some(timeout) = self.options.timeout {
                if started.elapsed() >= timeout {
                    tracing::error!(
                        "job still running after {:?}, giving up",
                        started.elapsed()
                    );
                    return Ok(RunResult::Error);
                }
            }

            tracing::debug!(
                "job still running, next check in {:?}",
                self.options.poll_interval
            );
            sleep(self.options.poll_interval).await;
            result = self.poll().await?;
        }

        Ok(result)
    }

    async fn poll(&mut self) -> Result<RunResult, JobError> {
        self.transition(DriverState::Polling);
        let result = self.job.check().await?;
        tracing::debug!("check returned {}", result);
        Ok(result)
    }

    async fn finish(&mut self, result: RunResult) -> RunResult {
        match result {
            RunResult::Wait => {
                tracing::info!("job is still running, leaving it for the next invocation");
                return result;
            }
            RunResult::Ok => self.transition(DriverState::Done),
            RunResult::Error => self.transition(DriverState::Failed),
        }

        self.cleanup().await;
        result
    }

    async fn cleanup(&mut self) {
        match self.job.cleanup().await {
            Ok(()) => self.transition(DriverState::Cleaned),
            Err(err) => tracing::warn!("cleanup failed: {}", err),
        }
    }

    fn transition(&mut self, next: DriverState) {
        if self.state != next {
            tracing::debug!("{:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
