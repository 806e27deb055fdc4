// Local artifact store. Bundles live at `<root>/<run-id>/<name>/`; expired
// bundles are evicted by `prune`.

use crate::artifact::manifest::ArtifactManifest;
use anyhow::Result;
use chrono::{DateTime, Utc};
use newsletter_common::constants::ARTIFACT_MANIFEST_FILE_NAME;
use newsletter_sdk::IOUtil;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub manifest: ArtifactManifest,
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle_directory(&self, run_id: &str, name: &str) -> PathBuf {
        self.root.join(run_id).join(name)
    }

    /// Every readable bundle, oldest first. Bundles with an unreadable
    /// manifest are logged and skipped.
    pub fn list(&self) -> Result<Vec<StoredArtifact>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_name() != ARTIFACT_MANIFEST_FILE_NAME || !entry.file_type().is_file() {
                continue;
            }
            let Some(directory) = entry.path().parent() else {
                continue;
            };
            match ArtifactManifest::load(directory) {
                Ok(manifest) => artifacts.push(StoredArtifact {
                    manifest,
                    directory: directory.to_path_buf(),
                }),
                Err(e) => tracing::warn!("Skipping artifact at {:?}: {:#}", directory, e),
            }
        }
        artifacts.sort_by(|a, b| a.manifest.created_at.cmp(&b.manifest.created_at));
        Ok(artifacts)
    }

    /// Delete bundles whose retention has elapsed at `now`, then any run
    /// directory left empty. Returns the removed bundles.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<Vec<StoredArtifact>> {
        let mut removed = Vec::new();
        for artifact in self.list()? {
            if !artifact.manifest.is_expired(now) {
                continue;
            }
            IOUtil::delete_directory(&artifact.directory)?;
            tracing::info!(
                "Removed artifact '{}' of run {} (expired {})",
                artifact.manifest.name,
                artifact.manifest.run_id,
                artifact.manifest.expires_at
            );
            if let Some(run_directory) = artifact.directory.parent() {
                // only succeeds when empty
                let _ = std::fs::remove_dir(run_directory);
            }
            removed.push(artifact);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seed(store: &ArtifactStore, run_id: &str, created_at: DateTime<Utc>, retention_days: u32) {
        let dir = store.bundle_directory(run_id, "newsletter");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("newsletter_1.html"), "<html/>").unwrap();
        ArtifactManifest::new("newsletter", run_id, created_at, retention_days, Vec::new())
            .save(&dir)
            .unwrap();
    }

    #[test]
    fn list_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nope"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn list_orders_by_creation_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let now = Utc::now();
        seed(&store, "run-b", now, 30);
        seed(&store, "run-a", now - Duration::days(2), 30);

        let broken = store.bundle_directory("run-c", "newsletter");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(ARTIFACT_MANIFEST_FILE_NAME), "not json").unwrap();

        let runs: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|a| a.manifest.run_id)
            .collect();
        assert_eq!(runs, vec!["run-a", "run-b"]);
    }

    #[test]
    fn prune_removes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let now = Utc::now();
        seed(&store, "old", now - Duration::days(31), 30);
        seed(&store, "fresh", now - Duration::days(29), 30);

        let removed = store.prune(now).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].manifest.run_id, "old");
        assert!(!dir.path().join("old").exists());
        assert!(store.bundle_directory("fresh", "newsletter").is_dir());
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
