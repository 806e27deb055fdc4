// Entry point of `newsletter-runner`.
//
// Parses the command line, installs the tracing subscriber, creates the
// HostContext and hands over to the Runner.

use clap::Parser;
use newsletter_common::constants::return_code;
use newsletter_common::host_context::HostContext;
use tracing_subscriber::EnvFilter;

use newsletter_listener::command_settings::{CommandSettings, LogFormat};
use newsletter_listener::runner::Runner;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() {
    let settings = CommandSettings::parse();
    init_tracing(settings.log_format);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");

    let exit_code = runtime.block_on(run(settings));
    std::process::exit(exit_code);
}

async fn run(settings: CommandSettings) -> i32 {
    tracing::info!(
        "newsletter-runner {} starting",
        env!("CARGO_PKG_VERSION")
    );

    let host_settings = match settings.host_settings() {
        Ok(host_settings) => host_settings,
        Err(e) => {
            tracing::error!("{:#}", e);
            return return_code::TERMINATED_ERROR;
        }
    };
    let host_context = HostContext::new(host_settings);
    let runner = Runner::new(host_context);

    match runner.execute_command(&settings).await {
        Ok(exit_code) => {
            tracing::info!("Runner exiting with code {}", exit_code);
            exit_code
        }
        Err(e) => {
            tracing::error!("Runner failed with error: {:#}", e);
            return_code::TERMINATED_ERROR
        }
    }
}
