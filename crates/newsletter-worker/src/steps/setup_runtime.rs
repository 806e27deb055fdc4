// setup-runtime: locate the pinned interpreter, check its version and
// optionally create a virtual environment inside the workspace.

use anyhow::{Context, Result};
use async_trait::async_trait;
use newsletter_common::constants::{path, steps, variables};
use newsletter_common::{JobError, RuntimeConfig, VarUtil};
use newsletter_sdk::{ProcessInvoker, TraceWriter, WhichUtil};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::run_process;
use crate::execution_context::{ExecutionContext, JobStep};

pub struct SetupRuntimeStep;

#[async_trait]
impl JobStep for SetupRuntimeStep {
    fn id(&self) -> &str {
        steps::SETUP_RUNTIME
    }

    fn display_name(&self) -> &str {
        "Set up runtime"
    }

    async fn run_async(&self, context: &mut ExecutionContext) -> Result<()> {
        let config = context.definition().runtime.clone();
        let workspace = context.workspace_directory();

        let candidates = interpreter_candidates(&config);
        context.debug(&format!("Interpreter candidates: {}", candidates.join(", ")));
        let (name, located) =
            WhichUtil::first_of(&candidates).ok_or_else(|| JobError::RuntimeNotFound {
                interpreter: config.interpreter.clone(),
                version: config.version.clone(),
            })?;
        context.info(&format!("Found '{}' at '{}'", name, located.display()));

        if !config.version.is_empty() {
            let reported = report_version(context, &workspace, &located).await?;
            if !version_matches(&reported, &config.version) {
                return Err(JobError::RuntimeVersionMismatch {
                    path: located.display().to_string(),
                    found: reported,
                    expected: config.version.clone(),
                }
                .into());
            }
            context.info(&format!("Version '{}' satisfies '{}'", reported, config.version));
        }

        let interpreter = if config.virtualenv {
            create_virtualenv(context, &workspace, &located).await?
        } else {
            located
        };

        context.global_mut().interpreter = Some(interpreter.clone());
        context.info(&format!("Using interpreter '{}'", interpreter.display()));
        Ok(())
    }
}

/// `python` + `3.11` gives `python3.11`, `python3`, `python`.
fn interpreter_candidates(config: &RuntimeConfig) -> Vec<String> {
    let base = config.interpreter.trim();
    let mut candidates = Vec::new();
    if !config.version.is_empty() {
        candidates.push(format!("{}{}", base, config.version));
        if let Some(major) = config.version.split('.').next().filter(|m| *m != config.version) {
            candidates.push(format!("{}{}", base, major));
        }
    }
    candidates.push(base.to_string());
    candidates.dedup();
    candidates
}

/// `--version` output, trimmed. Older interpreters print it on stderr.
async fn report_version(
    context: &mut ExecutionContext,
    workspace: &Path,
    interpreter: &Path,
) -> Result<String> {
    let trace: Arc<dyn TraceWriter> = Arc::new(context.host_context().get_trace("SetupRuntime"));
    let output = ProcessInvoker::new(trace)
        .capture(
            workspace,
            &interpreter.to_string_lossy(),
            &["--version".to_string()],
            &context.environment(),
            context.cancel_token(),
        )
        .await
        .with_context(|| format!("Unable to query the version of '{}'", interpreter.display()))?;

    let line = output
        .all_lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string();
    context.info(&line);
    Ok(line)
}

/// True when a token of `reported` equals `expected` or extends it with
/// further dot-separated parts (`3.11.4` satisfies `3.11`, `3.1` does not).
fn version_matches(reported: &str, expected: &str) -> bool {
    let prefix = format!("{}.", expected);
    reported
        .split_whitespace()
        .any(|token| token == expected || token.starts_with(&prefix))
}

async fn create_virtualenv(
    context: &mut ExecutionContext,
    workspace: &Path,
    interpreter: &Path,
) -> Result<PathBuf> {
    let venv = workspace.join(path::VIRTUALENV_DIRECTORY);
    let arguments = vec![
        "-m".to_string(),
        "venv".to_string(),
        path::VIRTUALENV_DIRECTORY.to_string(),
    ];
    let environment = context.environment();
    run_process(
        context,
        workspace,
        &interpreter.to_string_lossy(),
        &arguments,
        &environment,
        true,
    )
    .await
    .context("Unable to create the virtual environment")?;

    let bin = if cfg!(windows) {
        venv.join("Scripts")
    } else {
        venv.join("bin")
    };
    let executable = if cfg!(windows) { "python.exe" } else { "python" };

    {
        let mut global = context.global_mut();
        VarUtil::prepend_path(&mut global.environment_variables, &bin.to_string_lossy());
        global
            .environment_variables
            .insert(variables::VIRTUAL_ENV.to_string(), venv.to_string_lossy().to_string());
    }
    context.info(&format!("Created virtual environment at '{}'", venv.display()));
    Ok(bin.join(executable))
}
