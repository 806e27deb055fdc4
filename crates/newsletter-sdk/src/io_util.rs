use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::{thread, time::Duration};

/// The executable file extension for the current platform.
#[cfg(target_os = "windows")]
pub const EXE_EXTENSION: &str = ".exe";
#[cfg(not(target_os = "windows"))]
pub const EXE_EXTENSION: &str = "";

/// Filesystem helpers shared by the worker steps and the artifact store.
pub struct IOUtil;

impl IOUtil {
    /// Recursively delete a directory, retrying on transient failures.
    ///
    /// A missing directory is not an error. A symlink is unlinked, never followed.
    pub fn delete_directory(path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        if path.symlink_metadata()?.file_type().is_symlink() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove symlink '{}'", path.display()))?;
            return Ok(());
        }

        let max_retries = 3;
        let mut last_err = None;

        for attempt in 0..max_retries {
            match fs::remove_dir_all(path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        "Failed to delete '{}' (attempt {}): {}",
                        path.display(),
                        attempt + 1,
                        e
                    );
                    last_err = Some(e);
                    if attempt < max_retries - 1 {
                        thread::sleep(Duration::from_millis(100 * (attempt as u64 + 1)));
                    }
                }
            }
        }

        let err = last_err.unwrap_or_else(|| io::Error::other("unknown error"));
        Err(err).with_context(|| {
            format!(
                "Failed to delete directory '{}' after {} retries",
                path.display(),
                max_retries
            )
        })
    }

    /// Delete a single file. Returns `Ok(false)` when there was nothing to delete.
    pub fn delete_file(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete file '{}'", path.display()))
            }
        }
    }

    /// Copy `from` to `to`, creating parent directories. Returns bytes copied.
    pub fn copy_file(from: &Path, to: &Path) -> Result<u64> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
        }
        fs::copy(from, to).with_context(|| {
            format!("Failed to copy '{}' to '{}'", from.display(), to.display())
        })
    }

    /// Hex-encoded SHA-256 digest of a file's contents.
    pub fn sha256_file(path: &Path) -> Result<String> {
        let mut file = File::open(path)
            .with_context(|| format!("Failed to open '{}' for hashing", path.display()))?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Serialize a value as JSON and write it to a file.
    pub fn save_object<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json.as_bytes())
            .with_context(|| format!("Failed to write object to '{}'", path.display()))?;
        Ok(())
    }

    /// Read a file and deserialize it from JSON.
    pub fn load_object<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file '{}'", path.display()))?;
        let value = serde_json::from_str(&json)
            .with_context(|| format!("Failed to deserialize JSON from '{}'", path.display()))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Manifest {
        name: String,
        count: u32,
    }

    #[test]
    fn save_and_load_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("manifest.json");
        let original = Manifest {
            name: "newsletter".into(),
            count: 2,
        };
        IOUtil::save_object(&path, &original).unwrap();
        let loaded: Manifest = IOUtil::load_object(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn delete_file_reports_whether_it_existed() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("service_account.json");
        fs::write(&file_path, b"{}").unwrap();
        assert!(IOUtil::delete_file(&file_path).unwrap());
        assert!(!file_path.exists());
        assert!(!IOUtil::delete_file(&file_path).unwrap());
    }

    #[test]
    fn delete_directory_works() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("subdir");
        fs::create_dir_all(&inner).unwrap();
        fs::write(inner.join("file.txt"), b"data").unwrap();
        IOUtil::delete_directory(&inner).unwrap();
        assert!(!inner.exists());
        IOUtil::delete_directory(&inner).unwrap();
    }

    #[test]
    fn copy_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.html");
        fs::write(&from, b"<p>hi</p>").unwrap();
        let to = dir.path().join("x").join("y").join("a.html");
        assert_eq!(IOUtil::copy_file(&from, &to).unwrap(), 9);
        assert_eq!(fs::read(&to).unwrap(), b"<p>hi</p>");
    }

    #[test]
    fn sha256_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            IOUtil::sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
