use amp_job::ToolCache;
use aws_transcribe::TranscribeConfig;
use hmgm::{HmgmConfig, RestTracker, TaskTracker};
use hpc_dropbox::DropboxConfig;
use serde::Deserialize;
use std::sync::Arc;

const fn default_poll_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub aws_transcribe: Option<TranscribeConfig>,

    #[serde(default)]
    pub hpc_dropbox: Option<DropboxConfig>,

    #[serde(default)]
    pub hmgm: Option<HmgmConfig>,
}

/// Everything the backends share during one invocation.
pub struct AppContext {
    pub config: Config,
    pub s3_client: aws_sdk_s3::Client,
    pub transcribe_client: aws_sdk_transcribe::Client,
    /// Media formats already probed in this process
    pub formats: Arc<ToolCache<String>>,
    pub tracker: Option<Arc<dyn TaskTracker>>,
}

impl amp_app::ContextProvider<Config> for AppContext {
    async fn new(config: Config, aws_config: aws_config::SdkConfig) -> Self {
        let s3_client = aws_sdk_s3::Client::new(&aws_config);
        let transcribe_client = aws_sdk_transcribe::Client::new(&aws_config);

        let tracker = config.hmgm.as_ref().map(|hmgm| {
            Arc::new(RestTracker::new(&hmgm.tracker)) as Arc<dyn TaskTracker>
        });

        Self {
            config,
            s3_client,
            transcribe_client,
            formats: Arc::new(ToolCache::new()),
            tracker,
        }
    }
}
