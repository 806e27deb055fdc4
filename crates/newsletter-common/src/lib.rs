// newsletter-common: Shared services and infrastructure for the newsletter runner.
// Depends only on `newsletter-sdk`.

pub mod constants;
pub mod error;
pub mod host_context;
pub mod job_definition;
pub mod logging;
pub mod secret_masker;
pub mod secret_store;
pub mod template;
pub mod tracing;
pub mod trigger_event;
pub mod util;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use constants::WellKnownDirectory;
pub use error::JobError;
pub use host_context::{HostContext, HostSettings, ShutdownReason};
pub use job_definition::{
    ArtifactConfig, BotConfig, CheckoutConfig, CredentialConfig, DependencyConfig, DispatchConfig,
    IfNoFilesFound, InputSpec, InputType, JobDefinition, RuntimeConfig, ScheduleEntry,
    TriggerConfig,
};
pub use logging::StepLogger;
pub use secret_masker::SecretMasker;
pub use secret_store::SecretStore;
pub use crate::tracing::{TraceEventType, TraceManager, TraceSetting, Tracing};
pub use trigger_event::{TriggerEvent, TriggerKind};
pub use util::task_result_util::TaskResult;
pub use util::var_util::VarUtil;
