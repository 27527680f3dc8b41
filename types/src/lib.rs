use serde::{Deserialize, Serialize};

mod dropbox;
mod review;

pub use dropbox::{HpcJobRequest, HpcJobState, HpcJobStatus, HpcTimestamps};
pub use review::{ReviewContext, TaskRecord, TaskType};

/// Exit code reserved for "not ready yet, invoke me again later".
pub const EXIT_WAIT: u8 = 255;

/// The outcome of a job operation and of a whole driver invocation.
///
/// This is the only value ever returned to the operating environment, via
/// [`RunResult::exit_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    /// The job finished and its outputs are complete.
    Ok,

    /// The job failed permanently; do not retry.
    Error,

    /// Work is still in progress.
    Wait,
}

impl RunResult {
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Error => 1,
            Self::Wait => EXIT_WAIT,
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Wait)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Wait => "wait",
        }
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RunResult> for std::process::ExitCode {
    fn from(result: RunResult) -> Self {
        Self::from(result.exit_code())
    }
}

/// Live state of a remote job, always derived from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No job matching the fingerprint is known to the backend.
    Absent,

    InProgress,

    Complete,

    Failed,
}

impl JobStatus {
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Absent)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        })
    }
}
