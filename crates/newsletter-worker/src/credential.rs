// Scoped credential file. The file exists for as long as the guard does:
// it is removed by `release` or, on any other exit path, when dropped.

use anyhow::{Context, Result};
use newsletter_sdk::IOUtil;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct CredentialFile {
    path: PathBuf,
    released: bool,
}

impl CredentialFile {
    /// Write `contents` verbatim to `path`, owner read/write only on Unix.
    pub fn create(path: &Path, contents: &str) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .with_context(|| format!("Failed to create credential file '{}'", path.display()))?;
        // from here on a failure still removes the file
        let guard = Self {
            path: path.to_path_buf(),
            released: false,
        };
        #[cfg(unix)]
        {
            // `mode` only applies to newly created files
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict '{}'", path.display()))?;
        }
        file.write_all(contents.as_bytes())
            .and_then(|_| file.sync_all())
            .with_context(|| format!("Failed to write credential file '{}'", path.display()))?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Delete the file now. `Ok(false)` when it was already gone.
    pub fn release(mut self) -> Result<bool> {
        self.released = true;
        IOUtil::delete_file(&self.path)
    }
}

impl Drop for CredentialFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match IOUtil::delete_file(&self.path) {
            Ok(true) => tracing::info!("Removed credential file {:?}", self.path),
            Ok(false) => {}
            Err(e) => tracing::error!("Unable to remove credential file {:?}: {:#}", self.path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service_account.json");
        let guard = CredentialFile::create(&path, "{\"type\":\"service_account\"}").unwrap();
        assert!(guard.exists());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"type\":\"service_account\"}"
        );
        assert!(guard.release().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn release_of_missing_file_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service_account.json");
        let guard = CredentialFile::create(&path, "x").unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(!guard.release().unwrap());
    }

    #[test]
    fn drop_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service_account.json");
        {
            let _guard = CredentialFile::create(&path, "secret").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service_account.json");
        let _guard = CredentialFile::create(&path, "secret").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn create_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("service_account.json");
        assert!(CredentialFile::create(&path, "x").is_err());
    }
}
