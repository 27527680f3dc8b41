use amp_job::{Driver, RunResult};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

mod cli;
mod context;
mod registry;

use cli::Cli;
use context::{AppContext, Config};

/**
 * Run one step of a workflow against a remote backend.
 *
 * The job is named after its backend, inputs and outputs, so invoking this
 * again with the same command line picks up the job submitted earlier
 * instead of starting a new one. The exit code is the whole result:
 *   - 0 when the outputs are complete
 *   - 1 when the job failed (outputs are emptied and marked `.err`)
 *   - 255 when the job is still running (cooperative mode only)
 */
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let request = cli.request();

    if cli.print_fingerprint {
        return match request.fingerprint() {
            Ok(fingerprint) => {
                println!("{fingerprint}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("failed to compute job name: {err}");
                RunResult::Error.into()
            }
        };
    }

    let artifacts = request.artifacts(cli.wait_for_inputs);

    let app_context = amp_app::create_app_context::<AppContext, Config>(&cli.app_options()).await;
    let app_context = match app_context {
        Ok(app_context) => Arc::new(app_context),
        Err(err) => {
            // logging may not be installed
            eprintln!("failed to start: {err}");
            artifacts.mark_failed().await;
            return RunResult::Error.into();
        }
    };

    let options = cli.driver_options(
        app_context.config.poll_interval_secs,
        app_context.config.timeout_secs,
    );

    let job = match registry::registry().build(app_context, request).await {
        Ok(job) => job,
        Err(err) => {
            tracing::error!("failed to set up {} job: {}", cli.backend, err);
            artifacts.mark_failed().await;
            return RunResult::Error.into();
        }
    };

    let result = Driver::new(job.as_ref(), options)
        .with_artifacts(artifacts)
        .run()
        .await;

    result.into()
}
