use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures raised by job operations, backend construction, and artifact
/// handling.
///
/// The driver never lets one of these escape: it logs it, attempts cleanup
/// and reports [`types::RunResult::Error`].
#[derive(Error, Debug)]
pub enum JobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Unknown backend {tag:?} (known backends: {known})")]
    UnknownBackend { tag: String, known: String },
    #[error("Job {0} should exist on the backend but it doesn't")]
    Vanished(String),
    #[error("Backend error: {0}")]
    Backend(#[source] BoxError),
}

impl JobError {
    /// Wrap any backend-specific error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Backend(err.into())
    }

    pub fn invalid_parameter(
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
