use amp_job::JobError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HmgmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Ticket tracker request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Ticket tracker error: {0}")]
    Tracker(String),
}

impl From<HmgmError> for JobError {
    fn from(err: HmgmError) -> Self {
        match err {
            HmgmError::Io(err) => Self::Io(err),
            HmgmError::Json(err) => Self::Json(err),
            other => Self::backend(other),
        }
    }
}
