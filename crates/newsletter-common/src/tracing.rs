// Named, secret-masking trace sources. Every component of the runner logs
// through one of these so that no secret reaches the subscriber unmasked.

use crate::secret_masker::SecretMasker;
use chrono::Utc;
use newsletter_sdk::TraceWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceEventType {
    Verbose,
    Information,
    Warning,
    Error,
}

impl std::fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEventType::Verbose => write!(f, "VERB"),
            TraceEventType::Information => write!(f, "INFO"),
            TraceEventType::Warning => write!(f, "WARN"),
            TraceEventType::Error => write!(f, "ERR "),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceSetting {
    /// Messages below this level are dropped before masking.
    pub level: TraceEventType,
    /// Also echo formatted lines to stdout (useful when no subscriber is installed).
    pub print_to_stdout: bool,
}

impl Default for TraceSetting {
    fn default() -> Self {
        Self {
            level: TraceEventType::Verbose,
            print_to_stdout: false,
        }
    }
}

/// A trace source named after the component that owns it.
#[derive(Debug, Clone)]
pub struct Tracing {
    name: String,
    secret_masker: SecretMasker,
    setting: TraceSetting,
}

impl Tracing {
    pub fn new(name: impl Into<String>, secret_masker: SecretMasker, setting: TraceSetting) -> Self {
        Self {
            name: name.into(),
            secret_masker,
            setting,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn trace(&self, event_type: TraceEventType, message: &str) {
        if event_type < self.setting.level {
            return;
        }

        let masked = self.secret_masker.mask_secrets(message);
        let component = self.name.as_str();
        match event_type {
            TraceEventType::Error => tracing::error!(component, "{}", masked),
            TraceEventType::Warning => tracing::warn!(component, "{}", masked),
            TraceEventType::Information => tracing::info!(component, "{}", masked),
            TraceEventType::Verbose => tracing::debug!(component, "{}", masked),
        }

        if self.setting.print_to_stdout {
            let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
            println!("[{}][{}] {}: {}", timestamp, component, event_type, masked);
        }
    }

    pub fn entering(&self, name: &str) {
        self.verbose(&format!("Entering {}", name));
    }

    pub fn leaving(&self, name: &str) {
        self.verbose(&format!("Leaving {}", name));
    }

    /// Log a serializable value as pretty JSON at verbose level.
    pub fn verbose_object<T: serde::Serialize>(&self, item: &T) {
        match serde_json::to_string_pretty(item) {
            Ok(json) => self.verbose(&json),
            Err(e) => self.verbose(&format!("<serialization error: {}>", e)),
        }
    }

    /// Log an `anyhow` error with its whole cause chain.
    pub fn error_chain(&self, err: &anyhow::Error) {
        self.error(&err.to_string());
        for cause in err.chain().skip(1) {
            self.error(&format!("  caused by: {}", cause));
        }
    }
}

impl TraceWriter for Tracing {
    fn info(&self, message: &str) {
        self.trace(TraceEventType::Information, message);
    }

    fn verbose(&self, message: &str) {
        self.trace(TraceEventType::Verbose, message);
    }

    fn warning(&self, message: &str) {
        self.trace(TraceEventType::Warning, message);
    }

    fn error(&self, message: &str) {
        self.trace(TraceEventType::Error, message);
    }
}

/// Hands out trace sources sharing one masker and one setting.
#[derive(Debug, Clone)]
pub struct TraceManager {
    secret_masker: SecretMasker,
    setting: TraceSetting,
}

impl TraceManager {
    pub fn new(secret_masker: SecretMasker) -> Self {
        Self::with_setting(secret_masker, TraceSetting::default())
    }

    pub fn with_setting(secret_masker: SecretMasker, setting: TraceSetting) -> Self {
        Self {
            secret_masker,
            setting,
        }
    }

    pub fn get(&self, name: &str) -> Tracing {
        Tracing::new(name, self.secret_masker.clone(), self.setting.clone())
    }

    pub fn secret_masker(&self) -> &SecretMasker {
        &self.secret_masker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering_filters_verbose() {
        assert!(TraceEventType::Verbose < TraceEventType::Information);
        assert!(TraceEventType::Warning < TraceEventType::Error);
    }

    #[test]
    fn manager_sources_share_masker() {
        let manager = TraceManager::new(SecretMasker::new());
        let trace = manager.get("Scheduler");
        manager.secret_masker().add_value("hunter22");
        assert_eq!(trace.name(), "Scheduler");
        assert_eq!(trace.secret_masker.mask_secrets("pw hunter22"), "pw ***");
        // emitting without a subscriber must not panic
        trace.info("pw hunter22");
        trace.error_chain(&anyhow::anyhow!("outer").context("ctx"));
    }
}
