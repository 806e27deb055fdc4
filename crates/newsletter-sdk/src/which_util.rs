use anyhow::Result;
use std::path::PathBuf;

/// Executable lookup on PATH.
pub struct WhichUtil;

impl WhichUtil {
    /// Locate `command` on PATH (or accept it as a path to an executable).
    ///
    /// When `require` is true a missing command is an error, otherwise `Ok(None)`.
    pub fn which(command: &str, require: bool) -> Result<Option<PathBuf>> {
        if command.is_empty() {
            if require {
                anyhow::bail!("command must not be empty");
            }
            return Ok(None);
        }

        match which::which(command) {
            Ok(path) => {
                tracing::debug!("Located '{}' at '{}'", command, path.display());
                Ok(Some(path))
            }
            Err(e) if require => anyhow::bail!("{command}: command not found ({e})"),
            Err(_) => Ok(None),
        }
    }

    /// Return the first of `candidates` found on PATH, with the name that matched.
    pub fn first_of<'a>(candidates: &'a [String]) -> Option<(&'a str, PathBuf)> {
        candidates.iter().find_map(|candidate| {
            which::which(candidate)
                .ok()
                .map(|path| (candidate.as_str(), path))
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn finds_sh() {
        let found = WhichUtil::which("sh", true).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn missing_command_is_none_unless_required() {
        assert!(WhichUtil::which("definitely_not_a_cmd_42", false)
            .unwrap()
            .is_none());
        assert!(WhichUtil::which("definitely_not_a_cmd_42", true).is_err());
        assert!(WhichUtil::which("", false).unwrap().is_none());
    }

    #[test]
    fn first_of_skips_missing_candidates() {
        let candidates = vec!["definitely_not_a_cmd_42".to_string(), "sh".to_string()];
        let (name, _path) = WhichUtil::first_of(&candidates).unwrap();
        assert_eq!(name, "sh");
    }
}
