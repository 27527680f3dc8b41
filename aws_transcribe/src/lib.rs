//! Speech-to-text through Amazon Transcribe.
//!
//! The input media is uploaded to `s3://<bucket>/<directory>/<fingerprint>`
//! and a transcription job named after the fingerprint writes its transcript
//! next to it as `<fingerprint>.json`. The service rejects a second job with
//! the same name, which is what keeps concurrent invocations from
//! duplicating work.

use amp_job::{
    artifact, Job, JobError, JobFingerprint, JobRequest, JobStatus, RunResult, ToolCache,
};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_transcribe::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_transcribe::operation::get_transcription_job::GetTranscriptionJobError;
use aws_sdk_transcribe::operation::start_transcription_job::StartTranscriptionJobError;
use aws_sdk_transcribe::types::{
    LanguageCode, Media, MediaFormat, Settings, TranscriptionJob, TranscriptionJobStatus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

mod config;
mod error;
pub mod probe;

pub use config::TranscribeConfig;
pub use error::TranscribeError;

pub const TAG: &str = "aws-transcribe";

/// Parameter overriding the probed media format.
pub const AUDIO_FORMAT_PARAM: &str = "audio_format";

pub struct TranscribeJob {
    fingerprint: JobFingerprint,
    config: TranscribeConfig,
    s3: aws_sdk_s3::Client,
    transcribe: aws_sdk_transcribe::Client,
    formats: Arc<ToolCache<String>>,
    input: PathBuf,
    output: PathBuf,
    audio_format: Option<String>,
}

impl TranscribeJob {
    /// # Errors
    /// If the configuration is invalid, the request lacks an input or output,
    /// or `audio_format` names an unsupported format.
    pub fn new(
        config: TranscribeConfig,
        s3: aws_sdk_s3::Client,
        transcribe: aws_sdk_transcribe::Client,
        formats: Arc<ToolCache<String>>,
        request: &JobRequest,
    ) -> Result<Self, JobError> {
        config.validate()?;

        let audio_format = request.param(AUDIO_FORMAT_PARAM).map(str::to_lowercase);
        if let Some(format) = &audio_format {
            if !probe::SUPPORTED_FORMATS.contains(&format.as_str()) {
                return Err(JobError::invalid_parameter(
                    AUDIO_FORMAT_PARAM,
                    format!(
                        "{format} is not one of {}",
                        probe::SUPPORTED_FORMATS.join(", ")
                    ),
                ));
            }
        }

        Ok(Self {
            fingerprint: request.fingerprint()?,
            config,
            s3,
            transcribe,
            formats,
            input: request.primary_input()?.to_path_buf(),
            output: request.primary_output()?.to_path_buf(),
            audio_format,
        })
    }

    fn job_name(&self) -> &str {
        self.fingerprint.as_str()
    }

    async fn media_format(&self) -> Result<String, TranscribeError> {
        if let Some(format) = &self.audio_format {
            return Ok(format.clone());
        }

        let format = probe::detect(&self.formats, &self.input).await?;
        tracing::debug!("detected media format {} for {}", format, self.input.display());
        Ok(format.to_string())
    }

    /// The job as the service reports it, or `None` if it doesn't exist.
    async fn describe(&self) -> Result<Option<TranscriptionJob>, TranscribeError> {
        match self
            .transcribe
            .get_transcription_job()
            .transcription_job_name(self.job_name())
            .send()
            .await
        {
            Ok(output) => Ok(output.transcription_job().cloned()),
            Err(err) if err.as_service_error().is_some_and(is_missing_job) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn start(
        &self,
        media_format: &str,
    ) -> Result<(), SdkError<StartTranscriptionJobError>> {
        self.transcribe
            .start_transcription_job()
            .transcription_job_name(self.job_name())
            .media(
                Media::builder()
                    .media_file_uri(self.config.media_uri(&self.fingerprint))
                    .build(),
            )
            .media_format(MediaFormat::from(media_format))
            .language_code(LanguageCode::from(self.config.language_code.as_str()))
            .output_bucket_name(&self.config.bucket)
            .output_key(self.config.transcript_key(&self.fingerprint))
            .settings(
                Settings::builder()
                    .show_speaker_labels(true)
                    .max_speaker_labels(self.config.max_speaker_labels)
                    .build(),
            )
            .send()
            .await?;

        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), TranscribeError> {
        // deleting a missing key succeeds
        self.s3
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await?;

        tracing::debug!("removed s3://{}/{}", self.config.bucket, key);
        Ok(())
    }

    async fn download_transcript(&self) -> Result<u64, TranscribeError> {
        let key = self.config.transcript_key(&self.fingerprint);
        let partial = artifact::partial_path(&self.output);

        let result = self.download_to(&key, &partial).await;
        match result {
            Ok(written) => {
                tokio::fs::rename(&partial, &self.output).await?;
                Ok(written)
            }
            Err(err) => {
                if let Err(remove_err) = artifact::remove_if_exists(&partial).await {
                    tracing::warn!(
                        "failed to remove partial download {}: {}",
                        partial.display(),
                        remove_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn download_to(&self, key: &str, path: &Path) -> Result<u64, TranscribeError> {
        let mut object = self
            .s3
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0_u64;
        while let Some(bytes) = object.body.try_next().await? {
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// The service answers an unknown job name with either `NotFoundException`
/// or a `BadRequestException` saying the job couldn't be found.
fn is_missing_job(err: &GetTranscriptionJobError) -> bool {
    match err {
        GetTranscriptionJobError::NotFoundException(_) => true,
        GetTranscriptionJobError::BadRequestException(exception) => exception
            .message()
            .or_else(|| err.meta().message())
            .is_some_and(|message| message.contains("couldn't be found")),
        _ => false,
    }
}

fn job_status(status: Option<&TranscriptionJobStatus>) -> JobStatus {
    match status {
        Some(TranscriptionJobStatus::Completed) => JobStatus::Complete,
        Some(TranscriptionJobStatus::Failed) => JobStatus::Failed,
        _ => JobStatus::InProgress,
    }
}

#[async_trait]
impl Job for TranscribeJob {
    fn fingerprint(&self) -> &JobFingerprint {
        &self.fingerprint
    }

    async fn exists(&self) -> Result<JobStatus, JobError> {
        let job = self.describe().await?;
        Ok(job.map_or(JobStatus::Absent, |job| {
            job_status(job.transcription_job_status())
        }))
    }

    async fn submit(&self) -> Result<RunResult, JobError> {
        let media_format = self.media_format().await?;
        let key = self.config.object_key(&self.fingerprint);

        tracing::info!(
            "uploading {} to s3://{}/{}",
            self.input.display(),
            self.config.bucket,
            key
        );
        let body = ByteStream::from_path(&self.input)
            .await
            .map_err(TranscribeError::from)?;
        self.s3
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(TranscribeError::from)?;

        match self.start(&media_format).await {
            Ok(()) => {
                tracing::info!("started transcription job {}", self.job_name());
                Ok(RunResult::Wait)
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(StartTranscriptionJobError::is_conflict_exception) =>
            {
                tracing::warn!(
                    "transcription job {} was already started by another invocation",
                    self.job_name()
                );
                Ok(RunResult::Wait)
            }
            Err(err) => {
                tracing::error!("{}", TranscribeError::from(err));
                if let Err(cleanup_err) = self.delete_object(&key).await {
                    tracing::warn!("failed to remove uploaded media: {}", cleanup_err);
                }
                Ok(RunResult::Error)
            }
        }
    }

    async fn check(&self) -> Result<RunResult, JobError> {
        let Some(job) = self.describe().await? else {
            return Err(JobError::Vanished(self.job_name().to_string()));
        };

        match job.transcription_job_status() {
            Some(TranscriptionJobStatus::Completed) => {
                let written = self.download_transcript().await?;
                tracing::info!(
                    "transcription job {} completed, wrote {} bytes to {}",
                    self.job_name(),
                    written,
                    self.output.display()
                );
                Ok(RunResult::Ok)
            }
            Some(TranscriptionJobStatus::Failed) => {
                tracing::error!(
                    "transcription failed: {}",
                    job.failure_reason().unwrap_or("no reason given")
                );
                Ok(RunResult::Error)
            }
            status => {
                tracing::debug!("transcription job status: {:?}", status);
                Ok(RunResult::Wait)
            }
        }
    }

    async fn cleanup(&self) -> Result<(), JobError> {
        self.delete_object(&self.config.object_key(&self.fingerprint))
            .await?;
        self.delete_object(&self.config.transcript_key(&self.fingerprint))
            .await?;

        if self.describe().await?.is_some() {
            self.transcribe
                .delete_transcription_job()
                .transcription_job_name(self.job_name())
                .send()
                .await
                .map_err(TranscribeError::from)?;
            tracing::info!("removed transcription job {}", self.job_name());
        }

        Ok(())
    }
}
