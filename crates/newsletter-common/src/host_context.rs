// Process-wide context: directory layout, the shared secret masker, trace
// sources and coordinated shutdown.

use crate::constants::{self, WellKnownDirectory};
use crate::secret_masker::SecretMasker;
use crate::tracing::{TraceManager, TraceSetting, Tracing};

use anyhow::{Context, Result};
use newsletter_sdk::{StringUtil, TraceWriter};
use parking_lot::Mutex;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    UserCancelled,
    OperatingSystemShutdown,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::UserCancelled => write!(f, "UserCancelled"),
            ShutdownReason::OperatingSystemShutdown => write!(f, "OperatingSystemShutdown"),
        }
    }
}

/// Directory layout and trace behaviour for one runner process.
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub root: PathBuf,
    pub work: PathBuf,
    pub artifacts: PathBuf,
    pub diag: PathBuf,
    pub print_to_stdout: bool,
}

impl HostSettings {
    /// Default layout: `_work`, `_artifacts` and `_diag` under `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let print_to_stdout = env::var(constants::variables::PRINT_LOG_TO_STDOUT)
            .ok()
            .and_then(|v| StringUtil::convert_to_bool(&v))
            .unwrap_or(false);
        Self {
            work: root.join(constants::path::WORK_DIRECTORY),
            artifacts: root.join(constants::path::ARTIFACTS_DIRECTORY),
            diag: root.join(constants::path::DIAG_DIRECTORY),
            root,
            print_to_stdout,
        }
    }

    /// Root from `NEWSLETTER_RUNNER_ROOT`, falling back to the current directory.
    pub fn from_env() -> Result<Self> {
        let root = match env::var(constants::variables::ROOT) {
            Ok(root) if !root.is_empty() => PathBuf::from(root),
            _ => env::current_dir().context("Unable to resolve the current directory")?,
        };
        Ok(Self::for_root(root))
    }
}

pub struct HostContext {
    settings: HostSettings,
    secret_masker: SecretMasker,
    trace_manager: TraceManager,
    shutdown_token: CancellationToken,
    shutdown_reason: Mutex<Option<ShutdownReason>>,
}

impl HostContext {
    pub fn new(settings: HostSettings) -> Arc<Self> {
        let secret_masker = SecretMasker::new();
        let trace_setting = TraceSetting {
            print_to_stdout: settings.print_to_stdout,
            ..TraceSetting::default()
        };
        let trace_manager = TraceManager::with_setting(secret_masker.clone(), trace_setting);

        Arc::new(Self {
            settings,
            secret_masker,
            trace_manager,
            shutdown_token: CancellationToken::new(),
            shutdown_reason: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn get_directory(&self, directory: WellKnownDirectory) -> PathBuf {
        match directory {
            WellKnownDirectory::Root => self.settings.root.clone(),
            WellKnownDirectory::Work => self.settings.work.clone(),
            WellKnownDirectory::Artifacts => self.settings.artifacts.clone(),
            WellKnownDirectory::Diag => self.settings.diag.clone(),
        }
    }

    /// Resolve a well-known directory and create it if missing.
    pub fn ensure_directory(&self, directory: WellKnownDirectory) -> Result<PathBuf> {
        let path = self.get_directory(directory);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Unable to create {} directory {:?}", directory, path))?;
        Ok(path)
    }

    /// Resolve `path` against the runner root unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.settings.root.join(path)
        }
    }

    pub fn secret_masker(&self) -> &SecretMasker {
        &self.secret_masker
    }

    pub fn get_trace(&self, name: &str) -> Tracing {
        self.trace_manager.get(name)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        *self.shutdown_reason.lock()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        self.get_trace("HostContext")
            .info(&format!("Runner will be shutdown for {}", reason));
        *self.shutdown_reason.lock() = Some(reason);
        self.shutdown_token.cancel();
    }

    /// Sleep for `duration` or until `cancellation_token` fires, whichever is first.
    pub async fn delay(&self, duration: std::time::Duration, cancellation_token: CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = cancellation_token.cancelled() => {}
        }
    }
}
