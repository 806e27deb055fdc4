// JobDispatcher: hands trigger events to the worker. Each run gets a
// cancellation token derived from the runner's shutdown token, so a shutdown
// cancels every job in flight.

use anyhow::{Context, Result};
use newsletter_common::host_context::HostContext;
use newsletter_common::tracing::Tracing;
use newsletter_common::{JobDefinition, TriggerEvent};
use newsletter_sdk::TraceWriter;
use newsletter_worker::{JobReport, JobRequest, JobRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

pub struct JobDispatcher {
    context: Arc<HostContext>,
    definition: Arc<JobDefinition>,
    env_file: Option<PathBuf>,
    jobs: JoinSet<Result<JobReport>>,
    trace: Tracing,
}

impl JobDispatcher {
    pub fn new(context: Arc<HostContext>, definition: JobDefinition, env_file: Option<PathBuf>) -> Self {
        let trace = context.get_trace("JobDispatcher");
        Self {
            context,
            definition: Arc::new(definition),
            env_file,
            jobs: JoinSet::new(),
            trace,
        }
    }

    fn request(&self, trigger: TriggerEvent) -> JobRequest {
        JobRequest {
            definition: (*self.definition).clone(),
            trigger,
            env_file: self.env_file.clone(),
        }
    }

    /// Run a job and wait for it.
    pub async fn run_now(&self, trigger: TriggerEvent) -> Result<JobReport> {
        let request = self.request(trigger);
        JobRunner::new(Arc::clone(&self.context))
            .run_async(request, self.context.shutdown_token().child_token())
            .await
    }

    /// Start a job in the background. Runs may overlap.
    pub fn dispatch(&mut self, trigger: TriggerEvent) {
        self.trace.info(&format!(
            "Dispatching job '{}' ({})",
            self.definition.name, trigger.kind
        ));
        let request = self.request(trigger);
        let runner = JobRunner::new(Arc::clone(&self.context));
        let cancel_token = self.context.shutdown_token().child_token();
        self.jobs
            .spawn(async move { runner.run_async(request, cancel_token).await });
    }

    pub fn running(&self) -> usize {
        self.jobs.len()
    }

    /// Collect jobs that have already finished without waiting.
    pub fn reap(&mut self) -> Vec<JobReport> {
        let mut reports = Vec::new();
        while let Some(joined) = self.jobs.try_join_next() {
            if let Some(report) = self.completed(joined) {
                reports.push(report);
            }
        }
        reports
    }

    /// Wait for every job in flight.
    pub async fn wait_all(&mut self) -> Vec<JobReport> {
        let mut reports = Vec::new();
        while let Some(joined) = self.jobs.join_next().await {
            if let Some(report) = self.completed(joined) {
                reports.push(report);
            }
        }
        reports
    }

    fn completed(&self, joined: Result<Result<JobReport>, tokio::task::JoinError>) -> Option<JobReport> {
        match joined.context("Job task panicked").and_then(|r| r) {
            Ok(report) => {
                self.trace.info(&format!(
                    "Job {} finished: {}",
                    report.run_id, report.result
                ));
                Some(report)
            }
            Err(e) => {
                self.trace.error(&format!("Job could not run: {:#}", e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsletter_common::{HostSettings, ShutdownReason, TaskResult};
    use std::collections::BTreeMap;

    /// A job that needs nothing from the host: an empty source and a
    /// credential-less `true` as bot.
    fn trivial_definition() -> JobDefinition {
        let mut definition = JobDefinition::default();
        definition.checkout.source = PathBuf::from("project");
        definition.runtime.interpreter = "sh".into();
        definition.runtime.version = String::new();
        definition.runtime.virtualenv = false;
        definition.dependencies.installer = vec!["-c".into(), "true".into()];
        definition.dependencies.upgrade_installer = false;
        definition.credential = None;
        definition.bot.program = Some("true".into());
        definition.bot.script = String::new();
        definition.bot.env.clear();
        definition
    }

    fn host() -> (tempfile::TempDir, Arc<HostContext>) {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("requirements.txt"), "").unwrap();
        let host = HostContext::new(HostSettings::for_root(dir.path()));
        (dir, host)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dispatched_jobs_are_collected() {
        let (_dir, host) = host();
        let mut dispatcher = JobDispatcher::new(host, trivial_definition(), None);

        dispatcher.dispatch(TriggerEvent::workflow_dispatch(BTreeMap::new()));
        dispatcher.dispatch(TriggerEvent::workflow_dispatch(BTreeMap::new()));
        assert_eq!(dispatcher.running(), 2);

        let reports = dispatcher.wait_all().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.result == TaskResult::Succeeded));
        assert_ne!(reports[0].run_id, reports[1].run_id);
        assert_eq!(dispatcher.running(), 0);
        assert!(dispatcher.reap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_jobs() {
        let (_dir, host) = host();
        host.shutdown(ShutdownReason::UserCancelled);
        let dispatcher = JobDispatcher::new(Arc::clone(&host), trivial_definition(), None);

        let report = dispatcher
            .run_now(TriggerEvent::workflow_dispatch(BTreeMap::new()))
            .await
            .unwrap();
        assert_eq!(report.result, TaskResult::Canceled);
    }
}
