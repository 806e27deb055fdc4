// The seven steps of the newsletter job, and the subprocess helper they share.

pub mod checkout;
pub mod cleanup;
pub mod install_dependencies;
pub mod run_bot;
pub mod setup_runtime;
pub mod upload_artifact;
pub mod write_credentials;

pub use checkout::CheckoutStep;
pub use cleanup::CleanupStep;
pub use install_dependencies::InstallDependenciesStep;
pub use run_bot::RunBotStep;
pub use setup_runtime::SetupRuntimeStep;
pub use upload_artifact::UploadArtifactStep;
pub use write_credentials::WriteCredentialsStep;

use anyhow::{Context, Result};
use newsletter_sdk::{ProcessInvoker, TraceWriter};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::execution_context::ExecutionContext;

/// Run a process in `working_directory`, streaming stdout and stderr into
/// the step log as lines arrive.
///
/// The process is stopped (SIGINT, then SIGTERM, then SIGKILL) when the job
/// is cancelled or when the step future is dropped on timeout.
pub(crate) async fn run_process(
    context: &mut ExecutionContext,
    working_directory: &Path,
    file_name: &str,
    arguments: &[String],
    environment: &HashMap<String, String>,
    require_exit_code_zero: bool,
) -> Result<i32> {
    let trace: Arc<dyn TraceWriter> = Arc::new(context.host_context().get_trace("ProcessInvoker"));
    let mut invoker = ProcessInvoker::new(trace);
    let mut stdout = invoker
        .take_stdout_receiver()
        .context("stdout receiver was already taken")?;
    let mut stderr = invoker
        .take_stderr_receiver()
        .context("stderr receiver was already taken")?;

    let token = context.cancel_token().child_token();
    let _stop_on_drop = token.clone().drop_guard();

    context.write(&format!("[command]{} {}", file_name, arguments.join(" ")));

    let task = {
        let working_directory = working_directory.to_path_buf();
        let file_name = file_name.to_string();
        let arguments = arguments.to_vec();
        let environment = environment.clone();
        tokio::spawn(async move {
            let result = invoker
                .execute(
                    &working_directory,
                    &file_name,
                    &arguments,
                    &environment,
                    require_exit_code_zero,
                    false,
                    token,
                )
                .await;
            // closes both channels
            drop(invoker);
            result
        })
    };

    let (mut stdout_open, mut stderr_open) = (true, true);
    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout.recv(), if stdout_open => match line {
                Some(line) => context.write(&line.data),
                None => stdout_open = false,
            },
            line = stderr.recv(), if stderr_open => match line {
                Some(line) => context.write(&line.data),
                None => stderr_open = false,
            },
        }
    }

    task.await.context("Process task panicked")?
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::execution_context::tests::make_test_context;
    use newsletter_sdk::ProcessExitCodeError;

    #[tokio::test]
    async fn streams_both_streams_into_step_log() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_test_context(dir.path());
        let mut step = root.create_step_context(1, "probe", "Probe");

        let code = run_process(
            &mut step,
            dir.path(),
            "sh",
            &["-c".to_string(), "echo out; echo err >&2".to_string()],
            &HashMap::new(),
            true,
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        assert!(step.log_lines().iter().any(|l| l == "out"));
        assert!(step.log_lines().iter().any(|l| l == "err"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_error_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_test_context(dir.path());
        let mut step = root.create_step_context(1, "probe", "Probe");

        let err = run_process(
            &mut step,
            dir.path(),
            "sh",
            &["-c".to_string(), "exit 7".to_string()],
            &HashMap::new(),
            true,
        )
        .await
        .unwrap_err();
        assert_eq!(err.downcast_ref::<ProcessExitCodeError>().unwrap().exit_code, 7);

        let code = run_process(
            &mut step,
            dir.path(),
            "sh",
            &["-c".to_string(), "exit 7".to_string()],
            &HashMap::new(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(code, 7);
    }
}
