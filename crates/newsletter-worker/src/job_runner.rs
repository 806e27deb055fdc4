// JobRunner: runs one job from trigger to report. It creates the run's
// ephemeral workspace and diagnostics directory, resolves secrets, lets the
// job extension build the step list, drives the steps runner and finally
// writes the job report.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use newsletter_common::constants::{variables, JOB_REPORT_FILE_NAME};
use newsletter_common::host_context::HostContext;
use newsletter_common::util::task_result_util::TaskResult;
use newsletter_common::{JobDefinition, SecretStore, TriggerEvent, WellKnownDirectory};
use newsletter_plugins::ArtifactManifest;
use newsletter_sdk::{IOUtil, StringUtil, TraceWriter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::execution_context::{ExecutionContext, Global, StepRecord};
use crate::job_extension::JobExtension;
use crate::steps_runner::StepsRunner;

/// Everything needed to start a run.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub definition: JobDefinition,
    pub trigger: TriggerEvent,
    /// Dotenv file consulted for secrets missing from the environment.
    pub env_file: Option<PathBuf>,
}

/// Outcome of one run, saved as `<diag>/<run-id>/report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub run_id: String,
    pub job_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
    pub trigger: TriggerEvent,
    pub result: TaskResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactManifest>,
    /// Set when the workspace was kept on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
}

impl JobReport {
    pub fn exit_code(&self) -> i32 {
        self.result.to_exit_code()
    }

    pub fn step(&self, id: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        IOUtil::save_object(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        IOUtil::load_object(path)
    }
}

pub struct JobRunner {
    host_context: Arc<HostContext>,
}

impl JobRunner {
    pub fn new(host_context: Arc<HostContext>) -> Self {
        Self { host_context }
    }

    /// Run a job to completion. Step failures and cancellation are reported
    /// through `JobReport::result`; an `Err` means the run could not be set
    /// up at all (directories, secrets).
    pub async fn run_async(&self, request: JobRequest, cancel_token: CancellationToken) -> Result<JobReport> {
        let trace = self.host_context.get_trace("JobRunner");
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let JobRequest {
            definition,
            trigger,
            env_file,
        } = request;
        trace.info(&format!(
            "Starting job '{}' ({}) triggered by {}",
            definition.name, run_id, trigger.kind
        ));

        let work_directory = self.host_context.ensure_directory(WellKnownDirectory::Work)?;
        let diag_directory = self
            .host_context
            .ensure_directory(WellKnownDirectory::Diag)?
            .join(&run_id);
        std::fs::create_dir_all(&diag_directory)
            .with_context(|| format!("Unable to create {:?}", diag_directory))?;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("{}-", run_id))
            .keep(definition.keep_workspace)
            .tempdir_in(&work_directory)
            .with_context(|| format!("Unable to create a workspace in {:?}", work_directory))?;
        trace.info(&format!("Workspace: {}", workspace.path().display()));

        let env_file = env_file.map(|p| self.host_context.resolve(&p));
        let secrets = SecretStore::load(
            definition.referenced_secrets(),
            env_file.as_deref(),
            self.host_context.secret_masker(),
        )?;
        trace.info(&format!("Resolved {} secret(s)", secrets.len()));

        let write_debug = std::env::var(variables::STEP_DEBUG)
            .ok()
            .and_then(|v| StringUtil::convert_to_bool(&v))
            .unwrap_or(false);
        let global = Global {
            run_id: run_id.clone(),
            source_directory: self.host_context.resolve(&definition.checkout.source),
            definition: Arc::new(definition),
            trigger,
            secrets: Arc::new(secrets),
            workspace_directory: workspace.path().to_path_buf(),
            diag_directory: diag_directory.clone(),
            artifacts_directory: self.host_context.get_directory(WellKnownDirectory::Artifacts),
            environment_variables: HashMap::new(),
            interpreter: None,
            credential: None,
            artifact: None,
            step_records: Vec::new(),
            warnings: Vec::new(),
            cancel_token: cancel_token.clone(),
            write_debug,
        };
        let job_name = global.definition.name.clone();
        let mut root_context =
            ExecutionContext::new_root(Arc::clone(&self.host_context), global, job_name.clone());

        let job_extension = JobExtension::new();
        match job_extension.initialize_job(&mut root_context) {
            Ok(()) => {
                if let Err(e) = StepsRunner::new().run_async(&mut root_context).await {
                    root_context.error(&format!("Steps execution failed: {:#}", e));
                    root_context.set_result(TaskResult::Failed);
                }
            }
            Err(e) => {
                root_context.error(&format!("Job initialization failed: {:#}", e));
                root_context.set_result(TaskResult::Failed);
            }
        }
        job_extension.finalize_job(&mut root_context);

        let mut result = root_context.result().unwrap_or(TaskResult::Succeeded);
        if cancel_token.is_cancelled() {
            result = TaskResult::Canceled;
        }

        let kept_workspace = if root_context.definition().keep_workspace {
            Some(workspace.path().to_path_buf())
        } else {
            None
        };
        // removes the workspace unless it is kept
        drop(workspace);

        let report = {
            let mut global = root_context.global_mut();
            JobReport {
                run_id,
                job_name,
                runner: hostname::get().ok().map(|h| h.to_string_lossy().into_owned()),
                trigger: global.trigger.clone(),
                result,
                started_at,
                finished_at: Utc::now(),
                steps: std::mem::take(&mut global.step_records),
                warnings: std::mem::take(&mut global.warnings),
                artifact: global.artifact.take(),
                workspace: kept_workspace,
            }
        };

        let report_path = diag_directory.join(JOB_REPORT_FILE_NAME);
        if let Err(e) = report.save(&report_path) {
            trace.error(&format!("Unable to write job report {:?}: {:#}", report_path, e));
        }
        log_report(&trace, &report);
        Ok(report)
    }
}

fn log_report(trace: &dyn TraceWriter, report: &JobReport) {
    for step in &report.steps {
        trace.info(&format!(
            "  {:>2}. {:<22} {}",
            step.number, step.id, step.result
        ));
    }
    for warning in &report.warnings {
        trace.warning(warning);
    }
    if let Some(artifact) = &report.artifact {
        trace.info(&format!(
            "Artifact '{}': {} file(s), expires {}",
            artifact.name,
            artifact.files.len(),
            artifact.expires_at
        ));
    }
    trace.info(&format!(
        "Job '{}' ({}) completed with result: {}",
        report.job_name, report.run_id, report.result
    ));
}
