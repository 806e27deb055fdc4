// newsletter-worker: job and step execution engine for the newsletter runner.
// Depends on `newsletter-sdk`, `newsletter-common` and `newsletter-plugins`.
//
// Architecture:
//   JobRunner::run_async → JobExtension::initialize_job
//     → StepsRunner::run_async → JobStep::run_async (checkout … cleanup)

pub mod credential;
pub mod execution_context;
pub mod job_extension;
pub mod job_runner;
pub mod steps;
pub mod steps_runner;

pub use credential::CredentialFile;
pub use execution_context::{ExecutionContext, JobStep, StepCondition, StepRecord};
pub use job_runner::{JobReport, JobRequest, JobRunner};
