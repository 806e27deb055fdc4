// install-dependencies: upgrade the package installer, then install the
// dependency manifest with the provisioned interpreter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use newsletter_common::constants::steps;
use newsletter_common::JobError;

use super::run_process;
use crate::execution_context::{ExecutionContext, JobStep};

pub struct InstallDependenciesStep;

#[async_trait]
impl JobStep for InstallDependenciesStep {
    fn id(&self) -> &str {
        steps::INSTALL_DEPENDENCIES
    }

    fn display_name(&self) -> &str {
        "Install dependencies"
    }

    async fn run_async(&self, context: &mut ExecutionContext) -> Result<()> {
        let config = context.definition().dependencies.clone();
        let workspace = context.workspace_directory();
        let interpreter = context
            .global()
            .interpreter
            .clone()
            .context("No interpreter has been provisioned")?;
        let interpreter = interpreter.to_string_lossy().to_string();

        let manifest = workspace.join(&config.manifest);
        if !manifest.is_file() {
            return Err(JobError::ManifestNotFound(config.manifest.clone()).into());
        }

        let environment = context.environment();
        if config.upgrade_installer {
            if let Some(package) = config.installer.last() {
                let mut arguments = config.installer.clone();
                arguments.extend(["install", "--upgrade"].map(String::from));
                arguments.push(package.clone());
                context.info(&format!("Upgrading '{}'", package));
                run_process(context, &workspace, &interpreter, &arguments, &environment, true)
                    .await
                    .with_context(|| format!("Unable to upgrade '{}'", package))?;
            }
        }

        let mut arguments = config.installer.clone();
        arguments.extend(["install", "-r"].map(String::from));
        arguments.push(config.manifest.clone());
        context.info(&format!("Installing dependencies from '{}'", config.manifest));
        run_process(context, &workspace, &interpreter, &arguments, &environment, true)
            .await
            .context("Dependency installation failed")?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::execution_context::tests::make_test_context;
    use newsletter_common::{DependencyConfig, JobDefinition};
    use newsletter_sdk::ProcessExitCodeError;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn context_with(dir: &Path, installer: &[&str], upgrade: bool) -> ExecutionContext {
        let root = make_test_context(dir);
        {
            let mut global = root.global_mut();
            global.definition = Arc::new(JobDefinition {
                dependencies: DependencyConfig {
                    installer: installer.iter().map(|s| s.to_string()).collect(),
                    upgrade_installer: upgrade,
                    ..DependencyConfig::default()
                },
                ..JobDefinition::default()
            });
            global.interpreter = Some(PathBuf::from("sh"));
        }
        root
    }

    #[tokio::test]
    async fn runs_upgrade_then_install() {
        let dir = tempfile::tempdir().unwrap();
        let root = context_with(dir.path(), &["-c", "echo \"installer $*\"", "sh"], true);
        std::fs::write(root.workspace_directory().join("requirements.txt"), "openai\n").unwrap();

        let mut step = root.create_step_context(3, steps::INSTALL_DEPENDENCIES, "Install");
        InstallDependenciesStep.run_async(&mut step).await.unwrap();

        let lines = step.log_lines();
        let upgrade = lines.iter().position(|l| l == "installer install --upgrade sh").unwrap();
        let install = lines.iter().position(|l| l == "installer install -r requirements.txt").unwrap();
        assert!(upgrade < install);
    }

    #[tokio::test]
    async fn missing_manifest_fails_before_running_anything() {
        let dir = tempfile::tempdir().unwrap();
        let root = context_with(dir.path(), &["-c", "echo ran", "sh"], false);

        let mut step = root.create_step_context(3, steps::INSTALL_DEPENDENCIES, "Install");
        let err = InstallDependenciesStep.run_async(&mut step).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<JobError>(), Some(JobError::ManifestNotFound(_))));
        assert!(!step.log_lines().iter().any(|l| l == "ran"));
    }

    #[tokio::test]
    async fn installer_exit_code_fails_step() {
        let dir = tempfile::tempdir().unwrap();
        let root = context_with(dir.path(), &["-c", "exit 3", "sh"], false);
        std::fs::write(root.workspace_directory().join("requirements.txt"), "").unwrap();

        let mut step = root.create_step_context(3, steps::INSTALL_DEPENDENCIES, "Install");
        let err = InstallDependenciesStep.run_async(&mut step).await.unwrap_err();
        let exit = err.downcast_ref::<ProcessExitCodeError>().unwrap();
        assert_eq!(exit.exit_code, 3);
    }
}
