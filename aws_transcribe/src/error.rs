use amp_job::JobError;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::{
    delete_object::DeleteObjectError, get_object::GetObjectError, put_object::PutObjectError,
};
use aws_sdk_transcribe::operation::{
    delete_transcription_job::DeleteTranscriptionJobError,
    get_transcription_job::GetTranscriptionJobError,
    start_transcription_job::StartTranscriptionJobError,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Invalid aws_transcribe configuration: {0}")]
    Config(String),
    #[error("Failed to determine media format of {path}: {reason}")]
    Probe { path: String, reason: String },
    #[error("Failed to stream S3 object: {0}")]
    Stream(#[from] aws_sdk_s3::primitives::ByteStreamError),
    #[error("Failed to upload media to S3: {0}")]
    Upload(#[from] SdkError<PutObjectError>),
    #[error("Failed to download transcript from S3: {0}")]
    Download(#[from] SdkError<GetObjectError>),
    #[error("Failed to delete S3 object: {0}")]
    DeleteObject(#[from] SdkError<DeleteObjectError>),
    #[error("Failed to query transcription job: {0}")]
    GetJob(#[from] SdkError<GetTranscriptionJobError>),
    #[error("Failed to start transcription job: {0}")]
    StartJob(#[from] SdkError<StartTranscriptionJobError>),
    #[error("Failed to delete transcription job: {0}")]
    DeleteJob(#[from] SdkError<DeleteTranscriptionJobError>),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TranscribeError> for JobError {
    fn from(err: TranscribeError) -> Self {
        match err {
            TranscribeError::Io(err) => Self::Io(err),
            TranscribeError::Config(reason) => Self::Config(reason),
            other => Self::backend(other),
        }
    }
}
