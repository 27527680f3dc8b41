use amp_job::JobError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DropboxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize job document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Invalid job document: {0}")]
    Invalid(String),
    #[error("Dropbox directory {0} does not exist")]
    MissingDropbox(PathBuf),
}

impl From<DropboxError> for JobError {
    fn from(err: DropboxError) -> Self {
        match err {
            DropboxError::Io(err) => Self::Io(err),
            DropboxError::MissingDropbox(path) => {
                Self::Config(format!("dropbox directory {} does not exist", path.display()))
            }
            other => Self::backend(other),
        }
    }
}
