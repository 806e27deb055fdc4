// JobExtension: prepares a job before its steps run and tidies up after.
// Initialization checks the definition and builds the step list; the
// credential cleanup is registered as a post-job step.

use anyhow::{Context, Result};
use newsletter_plugins::artifact::manifest::{validate_artifact_name, validate_retention};

use crate::execution_context::{ExecutionContext, JobStep};
use crate::steps::{
    CheckoutStep, CleanupStep, InstallDependenciesStep, RunBotStep, SetupRuntimeStep,
    UploadArtifactStep, WriteCredentialsStep,
};

pub struct JobExtension;

impl Default for JobExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl JobExtension {
    pub fn new() -> Self {
        Self
    }

    /// Validate what can fail before any step runs, then queue the steps.
    pub fn initialize_job(&self, context: &mut ExecutionContext) -> Result<()> {
        context.info("Initializing job...");
        let definition = context.definition();

        definition.validate().context("Invalid job definition")?;
        validate_artifact_name(&definition.artifact.name)?;
        validate_retention(definition.artifact.retention_days)?;

        let (trigger, secret_names) = {
            let global = context.global();
            (global.trigger.clone(), global.secrets.names().map(str::to_string).collect::<Vec<_>>())
        };
        context.info(&format!("Triggered by {}", trigger.kind));
        if let Some(scheduled_for) = trigger.scheduled_for {
            context.info(&format!("Scheduled for {}", scheduled_for));
        }
        for (name, value) in &trigger.inputs {
            context.info(&format!("Input {}: {}", name, value));
        }
        context.debug(&format!("Secrets available: {}", secret_names.join(", ")));

        let (main, post) = Self::build_steps(context);
        context.job_steps.extend(main);
        context.post_job_steps.extend(post);

        context.info(&format!(
            "Job initialized with {} steps and {} post-job steps.",
            context.job_steps.len(),
            context.post_job_steps.len()
        ));
        Ok(())
    }

    /// The main steps in execution order, and the post-job steps in
    /// registration order.
    pub fn build_steps(context: &ExecutionContext) -> (Vec<Box<dyn JobStep>>, Vec<Box<dyn JobStep>>) {
        let definition = context.definition();
        let mut main: Vec<Box<dyn JobStep>> = vec![
            Box::new(CheckoutStep),
            Box::new(SetupRuntimeStep),
            Box::new(InstallDependenciesStep),
        ];
        let mut post: Vec<Box<dyn JobStep>> = Vec::new();

        if definition.credential.is_some() {
            main.push(Box::new(WriteCredentialsStep));
            post.push(Box::new(CleanupStep));
        }
        main.push(Box::new(RunBotStep));
        main.push(Box::new(UploadArtifactStep));
        (main, post)
    }

    /// Drop whatever the steps left behind. Runs after every step, including
    /// post-job steps, has finished.
    pub fn finalize_job(&self, context: &mut ExecutionContext) {
        context.info("Finalizing job...");

        // normally released by cleanup already; dropping deletes the file
        let leftover = context.global_mut().credential.take();
        if let Some(credential) = leftover {
            context.warning(&format!(
                "Credential file '{}' was still present at job end and has been removed",
                credential.path().display()
            ));
            drop(credential);
        }

        context.info("Job finalized.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialFile;
    use crate::execution_context::tests::make_test_context;
    use newsletter_common::constants::steps;
    use newsletter_common::{ArtifactConfig, JobDefinition};
    use std::sync::Arc;

    fn ids(steps: &[Box<dyn JobStep>]) -> Vec<&str> {
        steps.iter().map(|s| s.id()).collect()
    }

    #[test]
    fn builds_seven_steps_with_cleanup_last() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = make_test_context(dir.path());
        JobExtension::new().initialize_job(&mut ctx).unwrap();

        let main: Vec<&str> = ctx.job_steps.iter().map(|s| s.id()).collect();
        assert_eq!(
            main,
            vec![
                steps::CHECKOUT,
                steps::SETUP_RUNTIME,
                steps::INSTALL_DEPENDENCIES,
                steps::WRITE_CREDENTIALS,
                steps::RUN_BOT,
                steps::UPLOAD_ARTIFACT,
            ]
        );
        assert_eq!(ids(&ctx.post_job_steps), vec![steps::CLEANUP_CREDENTIALS]);
    }

    #[test]
    fn no_credential_means_no_credential_steps() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = make_test_context(dir.path());
        ctx.global_mut().definition = Arc::new(JobDefinition {
            credential: None,
            bot: newsletter_common::BotConfig {
                env: Default::default(),
                ..Default::default()
            },
            ..JobDefinition::default()
        });

        let (main, post) = JobExtension::build_steps(&ctx);
        assert!(!ids(&main).contains(&steps::WRITE_CREDENTIALS));
        assert!(post.is_empty());
    }

    #[test]
    fn invalid_artifact_name_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = make_test_context(dir.path());
        ctx.global_mut().definition = Arc::new(JobDefinition {
            artifact: ArtifactConfig {
                name: "news|letter".into(),
                ..ArtifactConfig::default()
            },
            ..JobDefinition::default()
        });
        assert!(JobExtension::new().initialize_job(&mut ctx).is_err());
        assert!(ctx.job_steps.is_empty());
    }

    #[test]
    fn finalize_removes_leftover_credential() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = make_test_context(dir.path());
        let path = ctx.workspace_directory().join("service_account.json");
        ctx.global_mut().credential = Some(CredentialFile::create(&path, "{}").unwrap());

        JobExtension::new().finalize_job(&mut ctx);
        assert!(!path.exists());
        assert_eq!(ctx.global().warnings.len(), 1);
    }
}
