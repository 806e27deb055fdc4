// Registry of secret values scrubbed from every log line, step log and
// report the runner emits. Cheap to clone; clones share one registry.

use parking_lot::RwLock;
use std::sync::Arc;

/// Replacement text for a masked value.
pub const MASK: &str = "***";

/// Lines of a multi-line secret shorter than this are not registered
/// individually (JSON punctuation such as `{` or `},` would mask everything).
const MIN_MULTILINE_FRAGMENT: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct SecretMasker {
    inner: Arc<RwLock<Registry>>,
}

#[derive(Debug, Default)]
struct Registry {
    /// Longest first, so a secret containing another is replaced whole.
    values: Vec<String>,
    shortest: usize,
}

impl Registry {
    fn insert(&mut self, value: &str) {
        if self.values.iter().any(|v| v == value) {
            return;
        }
        self.values.push(value.to_string());
        self.values.sort_by(|a, b| b.len().cmp(&a.len()));
        self.shortest = self.values.iter().map(String::len).min().unwrap_or(0);
    }
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret. Surrounding whitespace is dropped and blank values
    /// are ignored.
    pub fn add_value(&self, secret: &str) {
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            return;
        }
        self.inner.write().insert(trimmed);
    }

    /// Register a secret that may span several lines (a service-account JSON
    /// document, a PEM key). The whole value is registered, and so is each
    /// line long enough to be meaningful on its own, since output is masked
    /// one line at a time.
    pub fn add_multiline_value(&self, secret: &str) {
        self.add_value(secret);
        if !secret.contains('\n') {
            return;
        }
        let mut registry = self.inner.write();
        for line in secret.lines() {
            let line = line.trim();
            if line.len() >= MIN_MULTILINE_FRAGMENT {
                registry.insert(line);
            }
        }
    }

    pub fn clear(&self) {
        let mut registry = self.inner.write();
        registry.values.clear();
        registry.shortest = 0;
    }

    /// Replace every registered value found in `input` with `***`.
    pub fn mask_secrets(&self, input: &str) -> String {
        let registry = self.inner.read();
        if registry.values.is_empty() || input.len() < registry.shortest {
            return input.to_string();
        }

        let mut masked = input.to_string();
        for value in &registry.values {
            if masked.contains(value.as_str()) {
                masked = masked.replace(value.as_str(), MASK);
            }
        }
        masked
    }

    pub fn secret_count(&self) -> usize {
        self.inner.read().values.len()
    }
}
