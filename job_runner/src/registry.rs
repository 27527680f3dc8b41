use amp_job::{Job, JobError, JobRequest, Registry};
use std::sync::Arc;

use crate::context::AppContext;

fn missing_section(section: &str) -> JobError {
    JobError::Config(format!("the {section} configuration section is missing"))
}

/// Every backend this binary can drive.
pub fn registry() -> Registry<AppContext> {
    let mut registry = Registry::new();

    registry.register(
        aws_transcribe::TAG,
        |context: Arc<AppContext>, request: JobRequest| async move {
            let config = context
                .config
                .aws_transcribe
                .clone()
                .ok_or_else(|| missing_section("aws_transcribe"))?;

            let job = aws_transcribe::TranscribeJob::new(
                config,
                context.s3_client.clone(),
                context.transcribe_client.clone(),
                context.formats.clone(),
                &request,
            )?;
            Ok::<_, JobError>(Box::new(job) as Box<dyn Job>)
        },
    );

    registry.register(
        hpc_dropbox::TAG,
        |context: Arc<AppContext>, request: JobRequest| async move {
            let config = context
                .config
                .hpc_dropbox
                .as_ref()
                .ok_or_else(|| missing_section("hpc_dropbox"))?;

            let job = hpc_dropbox::DropboxJob::new(config, &request)?;
            Ok::<_, JobError>(Box::new(job) as Box<dyn Job>)
        },
    );

    registry.register(
        hmgm::TAG,
        |context: Arc<AppContext>, request: JobRequest| async move {
            let (Some(config), Some(tracker)) = (&context.config.hmgm, &context.tracker) else {
                return Err(missing_section("hmgm"));
            };

            let job = hmgm::HmgmJob::new(config, tracker.clone(), &request)?;
            Ok::<_, JobError>(Box::new(job) as Box<dyn Job>)
        },
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use amp_app::ContextProvider;
    use aws_config::{BehaviorVersion, Region};
    use hpc_dropbox::DropboxConfig;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn sdk_config() -> aws_config::SdkConfig {
        aws_config::SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build()
    }

    fn config() -> Config {
        Config {
            poll_interval_secs: 10,
            timeout_secs: None,
            aws_transcribe: None,
            hpc_dropbox: None,
            hmgm: None,
        }
    }

    fn request(tag: &str) -> JobRequest {
        JobRequest::new(
            tag,
            vec![PathBuf::from("/media/in.wav")],
            vec![PathBuf::from("/media/out.json")],
        )
        .with_param("script", "whisper")
    }

    #[test]
    fn test_all_backends_registered() {
        assert_eq!(
            registry().tags(),
            vec!["aws-transcribe", "hmgm", "hpc-dropbox"]
        );
    }

    #[tokio::test]
    async fn test_missing_section_is_a_config_error() {
        let context = Arc::new(AppContext::new(config(), sdk_config()).await);

        for tag in ["aws-transcribe", "hpc-dropbox", "hmgm"] {
            let result = registry().build(context.clone(), request(tag)).await;
            assert!(
                matches!(result, Err(JobError::Config(_))),
                "{tag} built without configuration"
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let context = Arc::new(AppContext::new(config(), sdk_config()).await);

        let Err(err) = registry().build(context, request("cluster")).await else {
            panic!("unknown backend was built");
        };
        assert_eq!(
            err.to_string(),
            "Unknown backend \"cluster\" (known backends: aws-transcribe, hmgm, hpc-dropbox)"
        );
    }

    #[tokio::test]
    async fn test_configured_backend_builds() {
        let config = Config {
            hpc_dropbox: Some(DropboxConfig {
                dropbox_dir: PathBuf::from("/dropbox"),
                script: None,
                stale_after_secs: 3600,
            }),
            ..config()
        };
        let context = Arc::new(AppContext::new(config, sdk_config()).await);

        let job = registry()
            .build(context, request("hpc-dropbox"))
            .await
            .unwrap();
        assert!(job.fingerprint().as_str().starts_with("HPC-DROPBOX-"));
    }
}
