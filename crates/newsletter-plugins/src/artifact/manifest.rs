use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use newsletter_common::constants::{ARTIFACT_MANIFEST_FILE_NAME, MAX_RETENTION_DAYS};
use newsletter_common::JobError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Characters the artifact store rejects in a name.
pub const INVALID_ARTIFACT_NAME_CHARS: &[char] = &['\\', '/', '"', ':', '<', '>', '|', '*', '?'];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Path relative to the bundle root, `/`-separated.
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub name: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub retention_days: u32,
    pub files: Vec<ArtifactFile>,
    pub total_size: u64,
}

impl ArtifactManifest {
    pub fn new(
        name: &str,
        run_id: &str,
        created_at: DateTime<Utc>,
        retention_days: u32,
        files: Vec<ArtifactFile>,
    ) -> Self {
        let total_size = files.iter().map(|f| f.size).sum();
        Self {
            name: name.to_string(),
            run_id: run_id.to_string(),
            created_at,
            expires_at: created_at + Duration::days(i64::from(retention_days)),
            retention_days,
            files,
            total_size,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn save(&self, bundle_directory: &Path) -> Result<()> {
        newsletter_sdk::IOUtil::save_object(&bundle_directory.join(ARTIFACT_MANIFEST_FILE_NAME), self)
    }

    pub fn load(bundle_directory: &Path) -> Result<Self> {
        newsletter_sdk::IOUtil::load_object(&bundle_directory.join(ARTIFACT_MANIFEST_FILE_NAME))
    }
}

pub fn validate_artifact_name(name: &str) -> Result<(), JobError> {
    if name.trim().is_empty() || name.contains(INVALID_ARTIFACT_NAME_CHARS) {
        return Err(JobError::InvalidArtifactName(name.to_string()));
    }
    Ok(())
}

pub fn validate_retention(days: u32) -> Result<(), JobError> {
    if days == 0 || days > MAX_RETENTION_DAYS {
        return Err(JobError::InvalidRetention {
            days,
            max: MAX_RETENTION_DAYS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_follows_retention() {
        let created = "2026-10-19T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let manifest = ArtifactManifest::new(
            "newsletter",
            "run-1",
            created,
            30,
            vec![
                ArtifactFile {
                    path: "a.html".into(),
                    size: 10,
                    sha256: "00".into(),
                },
                ArtifactFile {
                    path: "b.html".into(),
                    size: 5,
                    sha256: "11".into(),
                },
            ],
        );
        assert_eq!(manifest.expires_at, "2026-11-18T09:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(manifest.total_size, 15);
        assert!(!manifest.is_expired(created));
        assert!(manifest.is_expired(manifest.expires_at));
    }

    #[test]
    fn artifact_names() {
        assert!(validate_artifact_name("newsletter").is_ok());
        assert!(validate_artifact_name("weekly newsletter-2026").is_ok());
        assert!(validate_artifact_name("  ").is_err());
        for ch in INVALID_ARTIFACT_NAME_CHARS {
            let name = format!("news{ch}letter");
            assert!(
                matches!(validate_artifact_name(&name), Err(JobError::InvalidArtifactName(_))),
                "expected '{name}' to be rejected"
            );
        }
    }

    #[test]
    fn retention_bounds() {
        assert!(validate_retention(1).is_ok());
        assert!(validate_retention(90).is_ok());
        assert!(validate_retention(0).is_err());
        assert!(validate_retention(91).is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ArtifactManifest::new("newsletter", "run-2", Utc::now(), 30, Vec::new());
        manifest.save(dir.path()).unwrap();
        assert_eq!(ArtifactManifest::load(dir.path()).unwrap(), manifest);
    }
}
