// checkout: populate the empty workspace with the project sources, either by
// copying a local directory or by a shallow git clone.

use anyhow::{Context, Result};
use async_trait::async_trait;
use newsletter_common::constants::steps;
use newsletter_common::CheckoutConfig;
use std::path::{Path, PathBuf};

use super::run_process;
use crate::execution_context::{ExecutionContext, JobStep};

pub struct CheckoutStep;

#[async_trait]
impl JobStep for CheckoutStep {
    fn id(&self) -> &str {
        steps::CHECKOUT
    }

    fn display_name(&self) -> &str {
        "Checkout repository"
    }

    async fn run_async(&self, context: &mut ExecutionContext) -> Result<()> {
        let config = context.definition().checkout.clone();
        let workspace = context.workspace_directory();

        if let Some(repository) = &config.repository {
            return clone(context, &workspace, repository, config.git_ref.as_deref()).await;
        }

        let source = context.global().source_directory.clone();
        context.info(&format!(
            "Copying '{}' into '{}'",
            source.display(),
            workspace.display()
        ));
        if !source.is_dir() {
            anyhow::bail!("Checkout source '{}' is not a directory", source.display());
        }

        let copied = {
            let workspace = workspace.clone();
            tokio::task::spawn_blocking(move || copy_tree(&source, &workspace, &config))
                .await
                .context("Checkout copy panicked")??
        };
        for path in &copied {
            context.debug(&format!("  {}", path.display()));
        }
        context.info(&format!("Checked out {} file(s)", copied.len()));
        Ok(())
    }
}

async fn clone(
    context: &mut ExecutionContext,
    workspace: &Path,
    repository: &str,
    git_ref: Option<&str>,
) -> Result<()> {
    let mut arguments = vec!["clone".to_string(), "--depth".to_string(), "1".to_string()];
    if let Some(git_ref) = git_ref {
        arguments.push("--branch".to_string());
        arguments.push(git_ref.to_string());
    }
    arguments.push(repository.to_string());
    arguments.push(".".to_string());

    let environment = context.environment();
    run_process(context, workspace, "git", &arguments, &environment, true)
        .await
        .with_context(|| format!("Unable to clone '{}'", repository))?;
    Ok(())
}

/// Copy `source` into `destination`, skipping every entry with a path
/// component matching one of the exclude patterns. Returns the relative
/// paths of the copied files.
fn copy_tree(source: &Path, destination: &Path, config: &CheckoutConfig) -> Result<Vec<PathBuf>> {
    let patterns = config
        .exclude
        .iter()
        .map(|p| glob::Pattern::new(p).with_context(|| format!("Invalid exclude pattern '{}'", p)))
        .collect::<Result<Vec<_>>>()?;
    let source = source
        .canonicalize()
        .with_context(|| format!("Unable to resolve '{}'", source.display()))?;
    let destination_resolved = destination.canonicalize().ok();

    let walker = walkdir::WalkDir::new(&source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let excluded = entry
                .file_name()
                .to_str()
                .map_or(false, |name| patterns.iter().any(|p| p.matches(name)));
            // the workspace may live below the source directory
            let is_destination = destination_resolved
                .as_deref()
                .map_or(false, |d| entry.path() == d);
            !excluded && !is_destination
        });

    let mut copied = Vec::new();
    for entry in walker {
        let entry = entry?;
        let relative = entry.path().strip_prefix(&source)?.to_path_buf();
        let target = destination.join(&relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Unable to create '{}'", target.display()))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            copied.push(relative);
        } else {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("Unable to copy '{}'", entry.path().display()))?;
            copied.push(relative);
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let points_to = std::fs::read_link(link)?;
    std::os::unix::fs::symlink(&points_to, target)
        .with_context(|| format!("Unable to create link '{}'", target.display()))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    std::fs::copy(link, target)
        .map(|_| ())
        .with_context(|| format!("Unable to copy '{}'", link.display()))
}
