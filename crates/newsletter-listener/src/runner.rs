// Runner: dispatches the parsed command line to its handler and owns the
// process-level concerns (signal handling, exit codes).

use anyhow::{Context, Result};
use chrono::Utc;
use newsletter_common::constants::return_code;
use newsletter_common::host_context::{HostContext, ShutdownReason};
use newsletter_common::tracing::Tracing;
use newsletter_common::{JobDefinition, WellKnownDirectory};
use newsletter_plugins::artifact::manifest::{validate_artifact_name, validate_retention};
use newsletter_plugins::ArtifactStore;
use newsletter_sdk::TraceWriter;
use std::sync::Arc;

use crate::command_settings::{ArtifactsCommand, Command, CommandSettings, RunArgs};
use crate::job_dispatcher::JobDispatcher;
use crate::scheduler::Scheduler;
use crate::trigger::TriggerEvaluator;

pub struct Runner {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl Runner {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("Runner");
        Self { context, trace }
    }

    /// Run the selected command and return the process exit code.
    pub async fn execute_command(&self, settings: &CommandSettings) -> Result<i32> {
        self.trace.verbose(&format!("Command: {:?}", settings.command));

        match &settings.command {
            Command::Run(args) => self.run(settings, args).await,
            Command::Schedule { once } => self.schedule(settings, *once).await,
            Command::Next { count } => self.next(settings, *count),
            Command::Validate => self.validate(settings),
            Command::Artifacts(ArtifactsCommand::List) => self.list_artifacts(),
            Command::Artifacts(ArtifactsCommand::Prune) => self.prune_artifacts(),
        }
    }

    // -----------------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------------

    async fn run(&self, settings: &CommandSettings, args: &RunArgs) -> Result<i32> {
        let definition = settings.load_definition(&self.context)?;
        let trigger = TriggerEvaluator::new(&definition)?.dispatch(args.input_map())?;
        let env_file = settings.env_file(&self.context)?;

        self.listen_for_shutdown();
        let dispatcher = JobDispatcher::new(Arc::clone(&self.context), definition, env_file);
        let report = dispatcher.run_now(trigger).await?;

        println!("{} {} {}", report.job_name, report.run_id, report.result);
        Ok(report.exit_code())
    }

    async fn schedule(&self, settings: &CommandSettings, once: bool) -> Result<i32> {
        let definition = settings.load_definition(&self.context)?;
        let evaluator = TriggerEvaluator::new(&definition)?;
        let env_file = settings.env_file(&self.context)?;
        self.trace.info(&format!(
            "Scheduling job '{}' ({} schedule(s))",
            definition.name,
            definition.on.schedule.len()
        ));

        self.listen_for_shutdown();
        let mut dispatcher = JobDispatcher::new(Arc::clone(&self.context), definition, env_file);
        Scheduler::new(Arc::clone(&self.context), evaluator)
            .run(&mut dispatcher, once)
            .await
    }

    fn next(&self, settings: &CommandSettings, count: usize) -> Result<i32> {
        let definition = settings.load_definition(&self.context)?;
        let evaluator = TriggerEvaluator::new(&definition)?;
        for (expression, at) in evaluator.upcoming(Utc::now(), count) {
            println!("{}  {}", at.to_rfc3339(), expression);
        }
        Ok(return_code::SUCCESS)
    }

    fn validate(&self, settings: &CommandSettings) -> Result<i32> {
        let source = settings
            .definition_path(&self.context)
            .map_or_else(|| "built-in definition".to_string(), |p| p.display().to_string());
        let definition = settings
            .load_definition(&self.context)
            .with_context(|| format!("Invalid {}", source))?;
        check_definition(&definition)?;

        println!("# {}", source);
        print!("{}", definition.to_yaml()?);
        self.trace.info(&format!("'{}' is valid", source));
        Ok(return_code::SUCCESS)
    }

    fn list_artifacts(&self) -> Result<i32> {
        let now = Utc::now();
        for artifact in self.artifact_store().list()? {
            let manifest = &artifact.manifest;
            println!(
                "{}  {}  {} file(s)  {} bytes  expires {}{}",
                manifest.run_id,
                manifest.name,
                manifest.files.len(),
                manifest.total_size,
                manifest.expires_at.to_rfc3339(),
                if manifest.is_expired(now) { "  (expired)" } else { "" }
            );
        }
        Ok(return_code::SUCCESS)
    }

    fn prune_artifacts(&self) -> Result<i32> {
        let removed = self.artifact_store().prune(Utc::now())?;
        println!("Removed {} expired artifact(s)", removed.len());
        Ok(return_code::SUCCESS)
    }

    fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(self.context.get_directory(WellKnownDirectory::Artifacts))
    }

    // -----------------------------------------------------------------------
    // Signals
    // -----------------------------------------------------------------------

    /// Ctrl-C and SIGTERM cancel the shutdown token; running jobs then skip
    /// their remaining steps and still clean up.
    fn listen_for_shutdown(&self) {
        let context = Arc::clone(&self.context);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Ctrl-C received, shutting down");
                    context.shutdown(ShutdownReason::UserCancelled);
                }
                Err(e) => tracing::warn!("Unable to listen for Ctrl-C: {}", e),
            }
        });

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let context = Arc::clone(&self.context);
            tokio::spawn(async move {
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        tracing::info!("SIGTERM received, shutting down");
                        context.shutdown(ShutdownReason::OperatingSystemShutdown);
                    }
                    Err(e) => tracing::warn!("Unable to listen for SIGTERM: {}", e),
                }
            });
        }
    }
}

/// Everything the job checks at initialization, plus cron syntax.
pub fn check_definition(definition: &JobDefinition) -> Result<()> {
    definition.validate()?;
    TriggerEvaluator::new(definition)?;
    validate_artifact_name(&definition.artifact.name)?;
    validate_retention(definition.artifact.retention_days)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use newsletter_common::{HostSettings, JobError, ScheduleEntry};

    fn runner_for(args: &[&str]) -> (CommandSettings, Runner) {
        let settings =
            CommandSettings::try_parse_from(std::iter::once("newsletter-runner").chain(args.iter().copied()))
                .unwrap();
        let host = HostContext::new(settings.host_settings().unwrap());
        (settings, Runner::new(host))
    }

    #[test]
    fn check_definition_rejects_bad_cron() {
        let mut definition = JobDefinition::default();
        definition.on.schedule.push(ScheduleEntry {
            cron: "0 9 * *".into(),
        });
        let err = check_definition(&definition).unwrap_err();
        assert!(matches!(err.downcast_ref::<JobError>(), Some(JobError::InvalidCron { .. })));
        assert!(check_definition(&JobDefinition::default()).is_ok());
    }

    #[tokio::test]
    async fn validate_and_next_succeed_on_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        let (settings, runner) = runner_for(&["validate", "--root", root]);
        assert_eq!(runner.execute_command(&settings).await.unwrap(), return_code::SUCCESS);

        let (settings, runner) = runner_for(&["next", "--root", root, "-n", "2"]);
        assert_eq!(runner.execute_command(&settings).await.unwrap(), return_code::SUCCESS);
    }

    #[tokio::test]
    async fn validate_fails_on_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("newsletter.yml"), "artifact:\n  retention-days: 0\n").unwrap();
        let (settings, runner) = runner_for(&["validate", "--root", dir.path().to_str().unwrap()]);
        assert!(runner.execute_command(&settings).await.is_err());
    }

    #[tokio::test]
    async fn unknown_dispatch_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let (settings, runner) = runner_for(&["run", "--root", root, "-i", "dry_run=true"]);
        let err = runner.execute_command(&settings).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<JobError>(), Some(JobError::UnexpectedInput(_))));
    }

    #[tokio::test]
    async fn artifacts_prune_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        let (settings, runner) = runner_for(&["artifacts", "list", "--root", root]);
        assert_eq!(runner.execute_command(&settings).await.unwrap(), return_code::SUCCESS);
        let (settings, runner) = runner_for(&["artifacts", "prune", "--root", root]);
        assert_eq!(runner.execute_command(&settings).await.unwrap(), return_code::SUCCESS);
    }

    #[test]
    fn host_layout_follows_root() {
        let (_, runner) = runner_for(&["validate", "--root", "/srv/news"]);
        assert_eq!(
            runner.context.settings().root,
            HostSettings::for_root("/srv/news").root
        );
    }
}
