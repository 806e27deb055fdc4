// Collects files matching the artifact path pattern in a workspace and copies
// them into the artifact store.
//
// The path may hold several patterns, one per line; a line starting with `!`
// excludes what it matches. Patterns are relative to the workspace root.

use crate::artifact::artifact_store::ArtifactStore;
use crate::artifact::manifest::{
    validate_artifact_name, validate_retention, ArtifactFile, ArtifactManifest,
};
use anyhow::{Context, Result};
use chrono::Utc;
use newsletter_common::constants::ARTIFACT_MANIFEST_FILE_NAME;
use newsletter_common::{ArtifactConfig, IfNoFilesFound, JobError};
use newsletter_sdk::{IOUtil, TraceWriter};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Published(ArtifactManifest),
    /// Nothing matched and the policy allowed it. `warning` is set under
    /// `if-no-files-found: warn`.
    NoFiles { warning: Option<String> },
}

pub struct ArtifactPublisher {
    store: ArtifactStore,
}

impl ArtifactPublisher {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub async fn publish(
        &self,
        workspace: &Path,
        run_id: &str,
        config: &ArtifactConfig,
        trace: &dyn TraceWriter,
    ) -> Result<PublishOutcome> {
        validate_artifact_name(&config.name)?;
        validate_retention(config.retention_days)?;

        let workspace_root = workspace.to_path_buf();
        let pattern = config.path.clone();
        let files = tokio::task::spawn_blocking(move || collect_files(&workspace_root, &pattern))
            .await
            .context("Artifact file search panicked")??;

        if files.is_empty() {
            return match config.if_no_files_found {
                IfNoFilesFound::Error => Err(JobError::NoArtifactFiles(config.path.clone()).into()),
                IfNoFilesFound::Warn => {
                    let message = JobError::NoArtifactFiles(config.path.clone()).to_string();
                    trace.warning(&message);
                    Ok(PublishOutcome::NoFiles {
                        warning: Some(message),
                    })
                }
                IfNoFilesFound::Ignore => {
                    trace.info(&JobError::NoArtifactFiles(config.path.clone()).to_string());
                    Ok(PublishOutcome::NoFiles { warning: None })
                }
            };
        }

        trace.info(&format!(
            "With the provided path, there will be {} file(s) uploaded",
            files.len()
        ));

        let bundle = self.store.bundle_directory(run_id, &config.name);
        let manifest = {
            let workspace = workspace.to_path_buf();
            let bundle = bundle.clone();
            let name = config.name.clone();
            let run_id = run_id.to_string();
            let retention_days = config.retention_days;
            tokio::task::spawn_blocking(move || {
                copy_bundle(&workspace, &files, &bundle, &name, &run_id, retention_days)
            })
            .await
            .context("Artifact copy panicked")??
        };

        for file in &manifest.files {
            trace.verbose(&format!("  {} ({} bytes, sha256 {})", file.path, file.size, file.sha256));
        }
        trace.info(&format!(
            "Artifact '{}' has been successfully uploaded! Final size is {} bytes. Retention: {} days, expires {}",
            manifest.name, manifest.total_size, manifest.retention_days, manifest.expires_at
        ));
        trace.info(&format!("Stored at {}", bundle.display()));

        Ok(PublishOutcome::Published(manifest))
    }
}

/// Workspace-relative paths of the regular files selected by `patterns`.
fn collect_files(workspace: &Path, patterns: &str) -> Result<BTreeSet<PathBuf>> {
    let mut included = BTreeSet::new();
    let mut excluded = BTreeSet::new();

    for line in patterns.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (negated, pattern) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        let relative = Path::new(pattern);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            anyhow::bail!("Artifact path '{}' must be relative to the workspace", pattern);
        }

        let full = format!(
            "{}/{}",
            glob::Pattern::escape(&workspace.to_string_lossy()),
            pattern
        );
        for entry in glob::glob(&full).with_context(|| format!("Invalid artifact path '{}'", pattern))? {
            let path = entry?;
            let Ok(relative) = path.strip_prefix(workspace) else {
                continue;
            };
            if negated {
                excluded.insert(relative.to_path_buf());
            } else if path.is_file() {
                included.insert(relative.to_path_buf());
            } else if path.is_dir() {
                // a directory pattern uploads everything below it
                for file in walkdir::WalkDir::new(&path).into_iter().filter_map(|e| e.ok()) {
                    if file.file_type().is_file() {
                        if let Ok(rel) = file.path().strip_prefix(workspace) {
                            included.insert(rel.to_path_buf());
                        }
                    }
                }
            }
        }
    }

    let files: BTreeSet<PathBuf> = included
        .into_iter()
        .filter(|p| !excluded.contains(p))
        .collect();
    // the manifest is written at the bundle root
    if files.contains(Path::new(ARTIFACT_MANIFEST_FILE_NAME)) {
        anyhow::bail!(
            "'{}' is reserved for the artifact manifest and cannot be uploaded from the workspace root",
            ARTIFACT_MANIFEST_FILE_NAME
        );
    }
    Ok(files)
}

fn copy_bundle(
    workspace: &Path,
    files: &BTreeSet<PathBuf>,
    bundle: &Path,
    name: &str,
    run_id: &str,
    retention_days: u32,
) -> Result<ArtifactManifest> {
    // a previous attempt of this run may have left a partial bundle
    IOUtil::delete_directory(bundle)?;

    let mut entries = Vec::with_capacity(files.len());
    for relative in files {
        let source = workspace.join(relative);
        let size = IOUtil::copy_file(&source, &bundle.join(relative))?;
        entries.push(ArtifactFile {
            path: relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            size,
            sha256: IOUtil::sha256_file(&source)?,
        });
    }

    let manifest = ArtifactManifest::new(name, run_id, Utc::now(), retention_days, entries);
    manifest.save(bundle)?;
    Ok(manifest)
}
