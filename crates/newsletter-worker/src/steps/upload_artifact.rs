// upload-artifact: publish the newsletter files of the workspace into the
// artifact store.

use anyhow::Result;
use async_trait::async_trait;
use newsletter_common::constants::steps;
use newsletter_plugins::{ArtifactPublisher, ArtifactStore, PublishOutcome};
use newsletter_sdk::trace::{CollectingTraceWriter, TraceLevel};

use crate::execution_context::{ExecutionContext, JobStep};

pub struct UploadArtifactStep;

#[async_trait]
impl JobStep for UploadArtifactStep {
    fn id(&self) -> &str {
        steps::UPLOAD_ARTIFACT
    }

    fn display_name(&self) -> &str {
        "Upload newsletter artifact"
    }

    async fn run_async(&self, context: &mut ExecutionContext) -> Result<()> {
        let definition = context.definition();
        let workspace = context.workspace_directory();
        let (run_id, store_root) = {
            let global = context.global();
            (global.run_id.clone(), global.artifacts_directory.clone())
        };

        let publisher = ArtifactPublisher::new(ArtifactStore::new(store_root));
        let trace = CollectingTraceWriter::new();
        let outcome = publisher
            .publish(&workspace, &run_id, &definition.artifact, &trace)
            .await;

        // replay into the step log; warnings land in the job report
        for (level, message) in trace.messages() {
            match level {
                TraceLevel::Info => context.info(&message),
                TraceLevel::Verbose => context.debug(&message),
                TraceLevel::Warning => context.warning(&message),
                TraceLevel::Error => context.error(&message),
            }
        }

        if let PublishOutcome::Published(manifest) = outcome? {
            context.global_mut().artifact = Some(manifest);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_context::tests::make_test_context;
    use newsletter_common::{ArtifactConfig, IfNoFilesFound, JobDefinition, JobError};
    use std::sync::Arc;

    #[tokio::test]
    async fn records_published_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_test_context(dir.path());
        let workspace = root.workspace_directory();
        std::fs::write(workspace.join("newsletter_2026-10-19.html"), "<h1>Weekly</h1>").unwrap();
        std::fs::write(workspace.join("newsletter_test.html"), "<h1>Test</h1>").unwrap();

        let mut step = root.create_step_context(6, steps::UPLOAD_ARTIFACT, "Upload");
        UploadArtifactStep.run_async(&mut step).await.unwrap();

        let global = root.global();
        let manifest = global.artifact.as_ref().unwrap();
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.run_id, "run-test");
        assert!(global.warnings.is_empty());
        assert!(step
            .log_lines()
            .iter()
            .any(|l| l.contains("2 file(s) uploaded")));
    }

    #[tokio::test]
    async fn no_files_is_a_recorded_warning() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_test_context(dir.path());

        let mut step = root.create_step_context(6, steps::UPLOAD_ARTIFACT, "Upload");
        UploadArtifactStep.run_async(&mut step).await.unwrap();

        let global = root.global();
        assert!(global.artifact.is_none());
        assert_eq!(global.warnings.len(), 1);
        assert!(global.warnings[0].contains("No files were found"));
    }

    #[tokio::test]
    async fn no_files_with_error_policy_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_test_context(dir.path());
        root.global_mut().definition = Arc::new(JobDefinition {
            artifact: ArtifactConfig {
                if_no_files_found: IfNoFilesFound::Error,
                ..ArtifactConfig::default()
            },
            ..JobDefinition::default()
        });

        let mut step = root.create_step_context(6, steps::UPLOAD_ARTIFACT, "Upload");
        let err = UploadArtifactStep.run_async(&mut step).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<JobError>(), Some(JobError::NoArtifactFiles(_))));
    }
}
