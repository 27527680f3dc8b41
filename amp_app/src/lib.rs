use aws_config::{BehaviorVersion, meta::region::RegionProviderChain};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_PATH_ENV: &str = "AMP_CONFIG";

/// Configuration file used when neither `--config` nor `AMP_CONFIG` is given.
pub const DEFAULT_CONFIG_FILE: &str = "amp.yaml";

/// Prefix for configuration overrides taken from the environment.
pub const ENV_PREFIX: &str = "AMP_";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] figment::Error),
    #[error("Failed to install log subscriber: {0}")]
    Logging(String),
}

pub trait ContextProvider<Config> {
    fn new(
        config: Config,
        aws_config: aws_config::SdkConfig,
    ) -> impl Future<Output = Self>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Process-level options that shape bootstrap, usually taken from the CLI.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub debug: bool,
    pub log_format: LogFormat,
    pub config_path: Option<PathBuf>,
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr. The level defaults to INFO, or DEBUG when `debug` is
/// set; `RUST_LOG` overrides either.
///
/// # Errors
/// If a global subscriber has already been installed.
pub fn init_tracing(debug: bool, format: LogFormat) -> Result<(), AppError> {
    let default_directive = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            // this needs to be set to remove duplicated information in the log.
            .with_current_span(false)
            // ANSI codes are noise in collected batch logs.
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.map_err(|err| AppError::Logging(err.to_string()))
}

/// Resolve which configuration file to read.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(
        || {
            std::env::var_os(CONFIG_PATH_ENV)
                .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
        },
        Path::to_path_buf,
    )
}

/// Build the layered figment: the YAML file (if present) overridden by
/// `AMP_`-prefixed environment variables, `__` separating nested keys.
pub fn figment(explicit: Option<&Path>) -> Figment {
    Figment::new()
        .merge(Yaml::file(config_path(explicit)))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Extract the configuration.
///
/// # Errors
/// If a required value is missing or a value has the wrong type.
pub fn load_config<Config: serde::de::DeserializeOwned>(
    explicit: Option<&Path>,
) -> Result<Config, figment::Error> {
    figment(explicit).extract()
}

/// Initialize the application context: install logging, extract the
/// configuration with figment and load the AWS configuration using the
/// default provider chain.
///
/// # Errors
/// If logging cannot be installed or the configuration cannot be extracted.
pub async fn create_app_context<A, Config>(
    options: &AppOptions,
) -> Result<A, AppError>
where
    A: ContextProvider<Config>,
    Config: serde::de::DeserializeOwned,
{
    init_tracing(options.debug, options.log_format)?;

    let config: Config = load_config(options.config_path.as_deref())?;

    let region_provider =
        RegionProviderChain::default_provider().or_else("us-east-1");
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;

    let context = A::new(config, aws_config).await;

    Ok(context)
}
