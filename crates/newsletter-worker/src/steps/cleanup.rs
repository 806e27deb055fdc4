// cleanup-credentials: delete the credential file. Registered as a post-job
// step so it also runs after a failed or cancelled job. Best-effort: a
// failing delete is reported as a warning, never as a step failure.

use anyhow::Result;
use async_trait::async_trait;
use newsletter_common::constants::steps;
use newsletter_sdk::IOUtil;

use crate::execution_context::{ExecutionContext, JobStep, StepCondition};

pub struct CleanupStep;

#[async_trait]
impl JobStep for CleanupStep {
    fn id(&self) -> &str {
        steps::CLEANUP_CREDENTIALS
    }

    fn display_name(&self) -> &str {
        "Clean up credentials"
    }

    fn condition(&self) -> StepCondition {
        StepCondition::Always
    }

    async fn run_async(&self, context: &mut ExecutionContext) -> Result<()> {
        let credential = context.global_mut().credential.take();
        let outcome = match credential {
            Some(credential) => {
                let path = credential.path().to_path_buf();
                credential.release().map(|removed| (path, removed))
            }
            None => {
                // write-credentials may have failed before handing over its guard
                let Some(config) = context.definition().credential.clone() else {
                    context.info("No credential configured");
                    return Ok(());
                };
                let path = context.workspace_directory().join(&config.file);
                IOUtil::delete_file(&path).map(|removed| (path, removed))
            }
        };

        match outcome {
            Ok((path, true)) => context.info(&format!("Removed '{}'", path.display())),
            Ok((path, false)) => context.info(&format!("'{}' was already absent", path.display())),
            Err(e) => context.warning(&format!("Unable to remove the credential file: {:#}", e)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialFile;
    use crate::execution_context::tests::make_test_context;

    #[tokio::test]
    async fn releases_guard() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_test_context(dir.path());
        let path = root.workspace_directory().join("service_account.json");
        root.global_mut().credential = Some(CredentialFile::create(&path, "{}").unwrap());

        let mut step = root.create_step_context(7, steps::CLEANUP_CREDENTIALS, "Cleanup");
        CleanupStep.run_async(&mut step).await.unwrap();

        assert!(!path.exists());
        assert!(root.global().credential.is_none());
        assert!(step.log_lines().iter().any(|l| l.starts_with("Removed")));
    }

    #[tokio::test]
    async fn absent_file_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_test_context(dir.path());

        let mut step = root.create_step_context(7, steps::CLEANUP_CREDENTIALS, "Cleanup");
        CleanupStep.run_async(&mut step).await.unwrap();

        assert!(step.log_lines().iter().any(|l| l.contains("already absent")));
        assert!(root.global().warnings.is_empty());
    }

    #[tokio::test]
    async fn removes_stray_file_without_guard() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_test_context(dir.path());
        let path = root.workspace_directory().join("service_account.json");
        std::fs::write(&path, "{}").unwrap();

        let mut step = root.create_step_context(7, steps::CLEANUP_CREDENTIALS, "Cleanup");
        CleanupStep.run_async(&mut step).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn always_runs() {
        assert_eq!(CleanupStep.condition(), StepCondition::Always);
    }
}
