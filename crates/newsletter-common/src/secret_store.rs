// Named secrets resolved for one run.
//
// Values come from the process environment first, then from an optional
// dotenv file; the file never overrides the environment. Each value is
// registered with the masker as soon as it is loaded.

use crate::secret_masker::SecretMasker;
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, Secret};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Default)]
pub struct SecretStore {
    values: BTreeMap<String, Secret<String>>,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `names`. Names found nowhere are simply absent from the store;
    /// consumers decide whether that is fatal.
    pub fn load<I, S>(names: I, dotenv: Option<&Path>, secret_masker: &SecretMasker) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let file_values = match dotenv {
            Some(path) => Self::read_dotenv(path)?,
            None => HashMap::new(),
        };

        let mut store = Self::new();
        for name in names {
            let name = name.as_ref();
            let value = std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| file_values.get(name).filter(|v| !v.is_empty()).cloned());
            if let Some(value) = value {
                store.insert(name, value, secret_masker);
            }
        }
        Ok(store)
    }

    fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
        let iter = dotenvy::from_path_iter(path)
            .with_context(|| format!("Unable to read env file {:?}", path))?;
        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.with_context(|| format!("Malformed env file {:?}", path))?;
            values.insert(key, value);
        }
        Ok(values)
    }

    pub fn insert(&mut self, name: &str, value: String, secret_masker: &SecretMasker) {
        secret_masker.add_multiline_value(&value);
        self.values.insert(name.to_string(), Secret::new(value));
    }

    pub fn get(&self, name: &str) -> Option<&Secret<String>> {
        self.values.get(name)
    }

    /// Plain value of `name`; callers must not log it.
    pub fn expose(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.expose_secret().as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_fills_names_missing_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(
            &env_file,
            "NLR_TEST_FROM_FILE=file-value-1\nNLR_TEST_BOTH=file-loses\nUNRELATED=x\n",
        )
        .unwrap();
        std::env::set_var("NLR_TEST_BOTH", "env-wins-1");

        let masker = SecretMasker::new();
        let store = SecretStore::load(
            ["NLR_TEST_FROM_FILE", "NLR_TEST_BOTH", "NLR_TEST_NOWHERE"],
            Some(&env_file),
            &masker,
        )
        .unwrap();

        assert_eq!(store.expose("NLR_TEST_FROM_FILE"), Some("file-value-1"));
        assert_eq!(store.expose("NLR_TEST_BOTH"), Some("env-wins-1"));
        assert!(!store.contains("NLR_TEST_NOWHERE"));
        assert!(!store.contains("UNRELATED"));
        assert_eq!(masker.mask_secrets("file-value-1 env-wins-1"), "*** ***");
    }

    #[test]
    fn missing_dotenv_file_is_error() {
        let masker = SecretMasker::new();
        let result = SecretStore::load(["X"], Some(Path::new("/nonexistent/.env")), &masker);
        assert!(result.is_err());
    }

    #[test]
    fn debug_output_hides_values() {
        let masker = SecretMasker::new();
        let mut store = SecretStore::new();
        store.insert("GMAIL_APP_PASSWORD", "abcd efgh ijkl".into(), &masker);
        let debug = format!("{:?}", store);
        assert!(debug.contains("GMAIL_APP_PASSWORD"));
        assert!(!debug.contains("abcd"));
        assert_eq!(store.len(), 1);
    }
}
