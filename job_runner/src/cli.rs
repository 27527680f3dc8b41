use amp_app::{AppOptions, LogFormat};
use amp_job::{DriverOptions, JobRequest, Mode, parse_param};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "job_runner")]
#[command(about = "Submit, poll and collect a long-running job on a remote backend")]
#[command(version)]
pub struct Cli {
    /// Backend tag, e.g. aws-transcribe, hpc-dropbox or hmgm
    pub backend: String,

    /// Input artifact (repeatable, order matters)
    #[arg(long = "input", value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Output artifact (repeatable, order matters)
    #[arg(long = "output", value_name = "PATH")]
    pub outputs: Vec<PathBuf>,

    /// Backend parameter
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Cooperative mode: do one step and exit 255 while the job runs
    #[arg(long)]
    pub lwlw: bool,

    /// Discard any existing job with the same name first
    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub debug: bool,

    /// Seconds between polls in synchronous mode
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Give up on a synchronous run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Treat missing or empty inputs as not produced yet instead of failed
    #[arg(long)]
    pub wait_for_inputs: bool,

    /// YAML configuration file (default: $AMP_CONFIG, then amp.yaml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Print the job name and exit without contacting the backend
    #[arg(long)]
    pub print_fingerprint: bool,
}

impl Cli {
    pub fn app_options(&self) -> AppOptions {
        AppOptions {
            debug: self.debug,
            log_format: self.log_format,
            config_path: self.config.clone(),
        }
    }

    pub fn request(&self) -> JobRequest {
        JobRequest::new(&self.backend, self.inputs.clone(), self.outputs.clone())
            .with_params(self.params.iter().cloned())
    }

    /// Flags override the configured interval and timeout.
    pub fn driver_options(
        &self,
        poll_interval_secs: u64,
        timeout_secs: Option<u64>,
    ) -> DriverOptions {
        DriverOptions {
            mode: if self.lwlw {
                Mode::Cooperative
            } else {
                Mode::Synchronous
            },
            force: self.force,
            poll_interval: Duration::from_secs(self.interval.unwrap_or(poll_interval_secs)),
            timeout: self.timeout.or(timeout_secs).map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "job_runner",
            "--lwlw",
            "--force",
            "hmgm",
            "--input",
            "/media/in.json",
            "--output",
            "/media/out.json",
            "--param",
            "task_type=ner",
            "--param",
            "task_json=/media/task.json",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.backend, "hmgm");
        assert_eq!(cli.log_format, LogFormat::Json);

        let request = cli.request();
        assert_eq!(request.tag(), "hmgm");
        assert_eq!(request.inputs(), [PathBuf::from("/media/in.json")]);
        assert_eq!(request.param("task_type"), Some("ner"));
        assert_eq!(request.param("task_json"), Some("/media/task.json"));

        let options = cli.driver_options(10, None);
        assert_eq!(options.mode, Mode::Cooperative);
        assert!(options.force);
    }

    #[test]
    fn test_inputs_keep_their_order() {
        let cli = Cli::try_parse_from([
            "job_runner",
            "hpc-dropbox",
            "--input",
            "b.wav",
            "--input",
            "a.wav",
            "--output",
            "out.json",
        ])
        .unwrap();

        assert_eq!(cli.inputs, vec![PathBuf::from("b.wav"), PathBuf::from("a.wav")]);
        assert_eq!(cli.request().primary_output().unwrap(), Path::new("out.json"));
    }

    #[test]
    fn test_synchronous_by_default() {
        let cli = Cli::try_parse_from(["job_runner", "aws-transcribe"]).unwrap();
        let options = cli.driver_options(10, Some(600));

        assert_eq!(options.mode, Mode::Synchronous);
        assert_eq!(options.poll_interval, Duration::from_secs(10));
        assert_eq!(options.timeout, Some(Duration::from_secs(600)));
        assert_eq!(cli.log_format, LogFormat::Compact);
    }

    #[test]
    fn test_flags_override_configured_timing() {
        let cli = Cli::try_parse_from([
            "job_runner",
            "aws-transcribe",
            "--interval",
            "2",
            "--timeout",
            "30",
        ])
        .unwrap();
        let options = cli.driver_options(10, Some(600));

        assert_eq!(options.poll_interval, Duration::from_secs(2));
        assert_eq!(options.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_rejects_malformed_param() {
        assert!(Cli::try_parse_from(["job_runner", "hmgm", "--param", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["job_runner"]).is_err());
    }
}
