// Well-known names shared by every crate: directories, environment variables,
// step ids, defaults of the built-in job definition and process exit codes.

use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Well-known directories used by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownDirectory {
    /// Runner root; every other directory defaults to a child of it.
    Root,
    /// Parent of the per-run ephemeral workspaces.
    Work,
    /// Artifact store.
    Artifacts,
    /// Diagnostics: step logs and job reports.
    Diag,
}

impl fmt::Display for WellKnownDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ---------------------------------------------------------------------------
// Top-level constants
// ---------------------------------------------------------------------------

/// Job definition file looked up in the runner root when none is given.
pub const DEFINITION_FILE_NAME: &str = "newsletter.yml";

/// Dotenv file looked up in the runner root when none is given.
pub const DOTENV_FILE_NAME: &str = ".env";

/// Name of the job report file written for each run.
pub const JOB_REPORT_FILE_NAME: &str = "report.json";

/// Name of the manifest written next to each artifact bundle.
pub const ARTIFACT_MANIFEST_FILE_NAME: &str = "manifest.json";

/// Upper bound accepted for artifact retention.
pub const MAX_RETENTION_DAYS: u32 = 90;

/// Default step / job timeout.
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 360;

/// Post-job steps get a fixed, short timeout.
pub const POST_STEP_TIMEOUT_MINUTES: u32 = 5;

// ---------------------------------------------------------------------------
// Path
// ---------------------------------------------------------------------------

/// Directory names relative to the runner root.
pub mod path {
    pub const WORK_DIRECTORY: &str = "_work";
    pub const ARTIFACTS_DIRECTORY: &str = "_artifacts";
    pub const DIAG_DIRECTORY: &str = "_diag";
    /// Virtual environment created inside a workspace.
    pub const VIRTUALENV_DIRECTORY: &str = ".venv";
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// Environment variables read by the runner itself.
pub mod variables {
    pub const ROOT: &str = "NEWSLETTER_RUNNER_ROOT";
    pub const DEFINITION: &str = "NEWSLETTER_RUNNER_DEFINITION";
    pub const ENV_FILE: &str = "NEWSLETTER_RUNNER_ENV_FILE";
    pub const PRINT_LOG_TO_STDOUT: &str = "NEWSLETTER_RUNNER_PRINT_LOG_TO_STDOUT";
    pub const STEP_DEBUG: &str = "NEWSLETTER_RUNNER_STEP_DEBUG";

    /// Exported to processes that run inside the workspace virtualenv.
    pub const VIRTUAL_ENV: &str = "VIRTUAL_ENV";
}

// ---------------------------------------------------------------------------
// Defaults of the built-in job definition
// ---------------------------------------------------------------------------

pub mod defaults {
    pub const JOB_NAME: &str = "weekly-newsletter";
    /// Every Monday at 09:00 UTC.
    pub const SCHEDULE: &str = "0 9 * * 1";
    pub const TEST_MODE_INPUT: &str = "test_mode";
    pub const TEST_MODE_DEFAULT: &str = "false";

    pub const INTERPRETER: &str = "python";
    pub const INTERPRETER_VERSION: &str = "3.11";
    pub const DEPENDENCY_MANIFEST: &str = "requirements.txt";

    pub const CREDENTIAL_SECRET: &str = "GOOGLE_SHEETS_CREDS";
    pub const CREDENTIAL_FILE: &str = "service_account.json";

    pub const BOT_SCRIPT: &str = "newsletter_bot.py";

    pub const ARTIFACT_NAME: &str = "newsletter";
    pub const ARTIFACT_PATH: &str = "newsletter_*.html";
    pub const ARTIFACT_RETENTION_DAYS: u32 = 30;
}

/// Environment variable contract of the bot process.
pub mod bot_env {
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const GMAIL_USER: &str = "GMAIL_USER";
    pub const GMAIL_APP_PASSWORD: &str = "GMAIL_APP_PASSWORD";
    pub const GOOGLE_SHEETS_CREDS_PATH: &str = "GOOGLE_SHEETS_CREDS_PATH";
    pub const TEST_MODE: &str = "TEST_MODE";
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Step ids, in execution order.
pub mod steps {
    pub const CHECKOUT: &str = "checkout";
    pub const SETUP_RUNTIME: &str = "setup-runtime";
    pub const INSTALL_DEPENDENCIES: &str = "install-dependencies";
    pub const WRITE_CREDENTIALS: &str = "write-credentials";
    pub const RUN_BOT: &str = "run-bot";
    pub const UPLOAD_ARTIFACT: &str = "upload-artifact";
    pub const CLEANUP_CREDENTIALS: &str = "cleanup-credentials";
}

// ---------------------------------------------------------------------------
// ReturnCode
// ---------------------------------------------------------------------------

/// Process exit codes of the `newsletter-runner` binary.
pub mod return_code {
    pub const SUCCESS: i32 = 0;
    pub const JOB_FAILED: i32 = 1;
    pub const TERMINATED_ERROR: i32 = 2;
    pub const JOB_CANCELED: i32 = 3;
}
