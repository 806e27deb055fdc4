// ExecutionContext: the mutable state of a running job and of each step in it.
// Step contexts share the job's `Global`; each owns its log file and result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsletter_common::host_context::HostContext;
use newsletter_common::logging::StepLogger;
use newsletter_common::secret_masker::SecretMasker;
use newsletter_common::util::task_result_util::TaskResult;
use newsletter_common::{JobDefinition, SecretStore, TriggerEvent};
use newsletter_plugins::ArtifactManifest;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::credential::CredentialFile;

// ---------------------------------------------------------------------------
// JobStep trait
// ---------------------------------------------------------------------------

/// When a step runs relative to the job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCondition {
    /// Only while every earlier step has succeeded.
    Success,
    /// Regardless of earlier failures or cancellation.
    Always,
}

#[async_trait]
pub trait JobStep: Send + Sync {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn condition(&self) -> StepCondition {
        StepCondition::Success
    }

    /// Per-step limit; the job timeout applies when `None`.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn run_async(&self, context: &mut ExecutionContext) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Global
// ---------------------------------------------------------------------------

/// Outcome of one step, as recorded in the job report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub number: usize,
    pub id: String,
    pub name: String,
    pub result: TaskResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// State shared by every context of one job.
pub struct Global {
    pub run_id: String,
    pub definition: Arc<JobDefinition>,
    pub trigger: TriggerEvent,
    pub secrets: Arc<SecretStore>,

    /// Root of the checked-out sources; every step runs here.
    pub workspace_directory: PathBuf,
    /// `<diag>/<run-id>`: step logs and the job report.
    pub diag_directory: PathBuf,
    /// Source directory copied by checkout when no repository is configured.
    pub source_directory: PathBuf,
    pub artifacts_directory: PathBuf,

    /// Variables added for child processes (`PATH`, `VIRTUAL_ENV`).
    pub environment_variables: HashMap<String, String>,
    /// Interpreter resolved by setup-runtime.
    pub interpreter: Option<PathBuf>,
    pub credential: Option<CredentialFile>,
    pub artifact: Option<ArtifactManifest>,

    pub step_records: Vec<StepRecord>,
    pub warnings: Vec<String>,

    pub cancel_token: CancellationToken,
    pub write_debug: bool,
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

pub struct ExecutionContext {
    host_context: Arc<HostContext>,
    global: Arc<RwLock<Global>>,
    display_name: String,
    current_step_id: Option<String>,
    result: Option<TaskResult>,
    result_message: Option<String>,

    /// Main steps, run in order.
    pub job_steps: VecDeque<Box<dyn JobStep>>,
    /// Post-job steps, run last-registered first after the main steps.
    pub post_job_steps: Vec<Box<dyn JobStep>>,

    secret_masker: SecretMasker,
    logger: Option<StepLogger>,
    log_lines: Vec<String>,
    is_completed: bool,
}

impl ExecutionContext {
    pub fn new_root(host_context: Arc<HostContext>, global: Global, display_name: String) -> Self {
        let secret_masker = host_context.secret_masker().clone();
        Self {
            host_context,
            global: Arc::new(RwLock::new(global)),
            display_name,
            current_step_id: None,
            result: None,
            result_message: None,
            job_steps: VecDeque::new(),
            post_job_steps: Vec::new(),
            secret_masker,
            logger: None,
            log_lines: Vec::new(),
            is_completed: false,
        }
    }

    /// Child context for the `number`-th step; its log goes to
    /// `<diag>/<run-id>/<NN>-<step-id>.log`.
    pub fn create_step_context(&self, number: usize, step_id: &str, display_name: &str) -> Self {
        let diag = self.global.read().diag_directory.clone();
        Self {
            host_context: Arc::clone(&self.host_context),
            global: Arc::clone(&self.global),
            display_name: display_name.to_string(),
            current_step_id: Some(step_id.to_string()),
            result: None,
            result_message: None,
            job_steps: VecDeque::new(),
            post_job_steps: Vec::new(),
            secret_masker: self.secret_masker.clone(),
            logger: Some(StepLogger::new(&diag, number, step_id, self.secret_masker.clone())),
            log_lines: Vec::new(),
            is_completed: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn current_step_id(&self) -> Option<&str> {
        self.current_step_id.as_deref()
    }

    pub fn host_context(&self) -> &Arc<HostContext> {
        &self.host_context
    }

    /// Never hold the guard across an `.await`.
    pub fn global(&self) -> parking_lot::RwLockReadGuard<'_, Global> {
        self.global.read()
    }

    pub fn global_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Global> {
        self.global.write()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.global.read().cancel_token.clone()
    }

    pub fn workspace_directory(&self) -> PathBuf {
        self.global.read().workspace_directory.clone()
    }

    pub fn definition(&self) -> Arc<JobDefinition> {
        Arc::clone(&self.global.read().definition)
    }

    /// Job environment for child processes.
    pub fn environment(&self) -> HashMap<String, String> {
        self.global.read().environment_variables.clone()
    }

    pub fn result(&self) -> Option<TaskResult> {
        self.result
    }

    pub fn result_message(&self) -> Option<&str> {
        self.result_message.as_deref()
    }

    pub fn set_result(&mut self, result: TaskResult) {
        self.result = Some(result);
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn secret_masker(&self) -> &SecretMasker {
        &self.secret_masker
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.logger
            .as_ref()
            .filter(|l| l.total_lines() > 0)
            .map(|l| l.path().to_path_buf())
    }

    // -----------------------------------------------------------------------
    // Logging
    // -----------------------------------------------------------------------

    fn append(&mut self, line: String) {
        if let Some(logger) = self.logger.as_mut() {
            logger.write(&line);
        }
        self.log_lines.push(line);
    }

    /// Write a line of step output.
    pub fn write(&mut self, message: &str) {
        let masked = self.secret_masker.mask_secrets(message);
        tracing::info!(target: "step", "[{}] {}", self.display_name, masked);
        self.append(masked);
    }

    pub fn info(&mut self, message: &str) {
        self.write(message);
    }

    pub fn debug(&mut self, message: &str) {
        if self.global.read().write_debug {
            let masked = self.secret_masker.mask_secrets(message);
            tracing::debug!(target: "step", "[{}] {}", self.display_name, masked);
            self.append(format!("##[debug]{}", masked));
        }
    }

    /// Warnings are also collected into the job report.
    pub fn warning(&mut self, message: &str) {
        let masked = self.secret_masker.mask_secrets(message);
        tracing::warn!(target: "step", "[{}] {}", self.display_name, masked);
        self.global.write().warnings.push(masked.clone());
        self.append(format!("##[warning]{}", masked));
    }

    pub fn error(&mut self, message: &str) {
        let masked = self.secret_masker.mask_secrets(message);
        tracing::error!(target: "step", "[{}] {}", self.display_name, masked);
        self.append(format!("##[error]{}", masked));
    }

    pub fn section(&mut self, message: &str) {
        let masked = self.secret_masker.mask_secrets(message);
        tracing::info!(target: "step", "[{}] >> {}", self.display_name, masked);
        self.append(format!("##[group]{}", masked));
    }

    pub fn end_section(&mut self) {
        self.append("##[endgroup]".to_string());
    }

    pub fn log_lines(&self) -> &[String] {
        &self.log_lines
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    pub fn complete(&mut self, result: TaskResult, message: Option<&str>) {
        if self.is_completed {
            tracing::warn!(
                "Attempted to complete already-completed context: {}",
                self.display_name
            );
            return;
        }

        self.result = Some(result);
        self.result_message = message.map(|s| s.to_string());
        self.is_completed = true;

        let msg = format!(
            "Finishing: {} (Result: {}{})",
            self.display_name,
            result,
            message.map(|m| format!(", Message: {}", m)).unwrap_or_default()
        );
        match result {
            TaskResult::Failed | TaskResult::Canceled => tracing::error!(target: "step", "{}", msg),
            _ => tracing::info!(target: "step", "{}", msg),
        }
        if let Some(logger) = self.logger.as_mut() {
            logger.end();
        }
    }
}
