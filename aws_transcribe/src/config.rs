use amp_job::JobFingerprint;
use serde::Deserialize;

use crate::TranscribeError;

fn default_language_code() -> String {
    "en-US".to_string()
}

const fn default_max_speaker_labels() -> i32 {
    10
}

/// The `aws_transcribe` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TranscribeConfig {
    /// Bucket receiving both the uploaded media and the transcript
    pub bucket: String,

    /// Key prefix inside the bucket, without leading or trailing `/`
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_language_code")]
    pub language_code: String,

    #[serde(default = "default_max_speaker_labels")]
    pub max_speaker_labels: i32,
}

impl TranscribeConfig {
    /// # Errors
    /// If the bucket is empty, the directory has a leading or trailing `/`,
    /// or the speaker label count is out of range.
    pub fn validate(&self) -> Result<(), TranscribeError> {
        if self.bucket.trim().is_empty() {
            return Err(TranscribeError::Config("bucket must be set".to_string()));
        }

        if let Some(directory) = &self.directory {
            if directory.starts_with('/') || directory.ends_with('/') {
                return Err(TranscribeError::Config(format!(
                    "directory {directory:?} must not begin or end with '/'"
                )));
            }
        }

        // limits of the transcription service
        if !(2..=30).contains(&self.max_speaker_labels) {
            return Err(TranscribeError::Config(format!(
                "max_speaker_labels must be between 2 and 30, got {}",
                self.max_speaker_labels
            )));
        }

        Ok(())
    }

    /// Key of the uploaded media for the job.
    pub fn object_key(&self, fingerprint: &JobFingerprint) -> String {
        match self.directory.as_deref() {
            Some(directory) if !directory.is_empty() => {
                format!("{directory}/{fingerprint}")
            }
            _ => fingerprint.to_string(),
        }
    }

    /// Key the service writes the transcript to.
    pub fn transcript_key(&self, fingerprint: &JobFingerprint) -> String {
        format!("{}.json", self.object_key(fingerprint))
    }

    pub fn media_uri(&self, fingerprint: &JobFingerprint) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amp_job::fingerprint::generate_from;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn config(directory: Option<&str>) -> TranscribeConfig {
        TranscribeConfig {
            bucket: "amp-media".to_string(),
            directory: directory.map(str::to_string),
            language_code: default_language_code(),
            max_speaker_labels: default_max_speaker_labels(),
        }
    }

    #[test]
    fn test_keys() {
        let fingerprint = generate_from(Path::new("/"), "aws-transcribe", &["/in.wav"]);

        let nested = config(Some("transcribe/in"));
        assert_eq!(
            nested.object_key(&fingerprint),
            format!("transcribe/in/{fingerprint}")
        );
        assert_eq!(
            nested.transcript_key(&fingerprint),
            format!("transcribe/in/{fingerprint}.json")
        );
        assert_eq!(
            nested.media_uri(&fingerprint),
            format!("s3://amp-media/transcribe/in/{fingerprint}")
        );

        assert_eq!(config(None).object_key(&fingerprint), fingerprint.to_string());
        assert_eq!(config(Some("")).object_key(&fingerprint), fingerprint.to_string());
    }

    #[test]
    fn test_validate() {
        assert!(config(Some("a/b")).validate().is_ok());
        assert!(config(Some("/a")).validate().is_err());
        assert!(config(Some("a/")).validate().is_err());

        let mut no_bucket = config(None);
        no_bucket.bucket = String::new();
        assert!(no_bucket.validate().is_err());

        let mut one_speaker = config(None);
        one_speaker.max_speaker_labels = 1;
        assert!(one_speaker.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let parsed: TranscribeConfig =
            serde_json::from_str(r#"{"bucket": "amp-media"}"#).unwrap();

        assert_eq!(parsed, config(None));
    }
}
