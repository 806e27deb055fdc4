// Error kinds raised by configuration, trigger and step code.
// Application layers wrap these in `anyhow::Error` with context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Invalid job definition: {0}")]
    InvalidDefinition(String),

    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Unexpected input(s) '{0}'")]
    UnexpectedInput(String),

    #[error("Input required and not supplied: {0}")]
    MissingInput(String),

    #[error("Invalid value '{value}' for input '{name}': {reason}")]
    InvalidInput {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Secret '{0}' is not set")]
    MissingSecret(String),

    #[error("Unable to locate interpreter '{interpreter}' satisfying version '{version}'")]
    RuntimeNotFound { interpreter: String, version: String },

    #[error("Interpreter '{path}' reports version '{found}', expected '{expected}'")]
    RuntimeVersionMismatch {
        path: String,
        found: String,
        expected: String,
    },

    #[error("Dependency manifest '{0}' not found in the workspace")]
    ManifestNotFound(String),

    #[error("No files were found with the provided path: {0}. No artifacts will be uploaded.")]
    NoArtifactFiles(String),

    #[error(
        "Artifact name is not valid: '{0}'. It cannot be empty or contain '\\', '/', '\"', ':', '<', '>', '|', '*', and '?'"
    )]
    InvalidArtifactName(String),

    #[error("Retention days must be between 1 and {max}, got {days}")]
    InvalidRetention { days: u32, max: u32 },
}
