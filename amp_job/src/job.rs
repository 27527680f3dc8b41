use async_trait::async_trait;
use types::{JobStatus, RunResult};

use crate::{JobError, JobFingerprint};

/// The capabilities every backend integration provides.
///
/// Each operation may perform network or filesystem I/O. An `Err` means the
/// operation itself could not be carried out (network failure, bad
/// response); a job the backend reports as failed is `Ok(RunResult::Error)`.
#[async_trait]
pub trait Job: Send + Sync {
    /// Name under which the job is known to the backend.
    fn fingerprint(&self) -> &JobFingerprint;

    /// Look up the job on the backend without changing anything.
    ///
    /// Returns [`JobStatus::Absent`] if no job carries this fingerprint.
    async fn exists(&self) -> Result<JobStatus, JobError>;

    /// Create the remote job.
    ///
    /// Must not start duplicate work if a job with this fingerprint already
    /// exists. A failure part-way through must either be rolled back or leave
    /// the backend in a state that `exists` reports as absent.
    ///
    /// Returns [`RunResult::Wait`] once work has started. A backend that can
    /// complete the work immediately may return [`RunResult::Ok`] after
    /// writing the outputs.
    async fn submit(&self) -> Result<RunResult, JobError>;

    /// Poll the submitted job. On [`RunResult::Ok`] the outputs have been
    /// retrieved and written.
    async fn check(&self) -> Result<RunResult, JobError>;

    /// Release remote and temporary resources tied to the fingerprint.
    ///
    /// Safe to call repeatedly and when no job exists; resources that are
    /// already gone are not an error.
    async fn cleanup(&self) -> Result<(), JobError>;
}
