// write-credentials: materialize the service-account secret as a file in the
// workspace, immediately before the bot runs.

use anyhow::Result;
use async_trait::async_trait;
use newsletter_common::constants::steps;
use newsletter_common::JobError;
use std::sync::Arc;

use crate::credential::CredentialFile;
use crate::execution_context::{ExecutionContext, JobStep};

pub struct WriteCredentialsStep;

#[async_trait]
impl JobStep for WriteCredentialsStep {
    fn id(&self) -> &str {
        steps::WRITE_CREDENTIALS
    }

    fn display_name(&self) -> &str {
        "Write credentials"
    }

    async fn run_async(&self, context: &mut ExecutionContext) -> Result<()> {
        let Some(config) = context.definition().credential.clone() else {
            context.info("No credential configured");
            return Ok(());
        };
        let secrets = Arc::clone(&context.global().secrets);
        let value = secrets
            .expose(&config.secret)
            .ok_or_else(|| JobError::MissingSecret(config.secret.clone()))?;

        // a guard at the same path would delete the new file when dropped
        let previous = context.global_mut().credential.take();
        if let Some(previous) = previous {
            previous.release()?;
        }

        let path = context.workspace_directory().join(&config.file);
        let credential = CredentialFile::create(&path, value)?;
        context.info(&format!(
            "Wrote secret '{}' to '{}'",
            config.secret,
            credential.path().display()
        ));
        context.global_mut().credential = Some(credential);
        Ok(())
    }
}
