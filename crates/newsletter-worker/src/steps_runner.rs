// StepsRunner: drains the main step queue, failing fast, then runs post-job
// steps last-registered first. Every step runs under a timeout and the job
// cancellation token; each outcome is recorded for the job report.

use anyhow::Result;
use chrono::Utc;
use newsletter_common::constants::POST_STEP_TIMEOUT_MINUTES;
use newsletter_common::util::task_result_util::{merge_task_results, TaskResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::execution_context::{ExecutionContext, JobStep, StepCondition, StepRecord};

pub struct StepsRunner;

impl Default for StepsRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl StepsRunner {
    pub fn new() -> Self {
        Self
    }

    pub async fn run_async(&self, context: &mut ExecutionContext) -> Result<()> {
        let mut number = 0usize;
        let job_timeout = context.definition().timeout();

        // Phase 1: main steps
        while let Some(step) = context.job_steps.pop_front() {
            number += 1;
            let cancel = context.cancel_token();

            if cancel.is_cancelled() {
                context.info(&format!(
                    "Skipping step '{}' due to job cancellation.",
                    step.display_name()
                ));
                self.record_skipped(context, number, step.as_ref(), "Job was cancelled");
                continue;
            }

            if !self.should_run(context, step.as_ref()) {
                context.info(&format!(
                    "Skipping step '{}' because an earlier step failed.",
                    step.display_name()
                ));
                self.record_skipped(context, number, step.as_ref(), "An earlier step failed");
                continue;
            }

            let timeout = step.timeout().unwrap_or(job_timeout);
            let result = self
                .run_step(context, number, step.as_ref(), timeout, cancel)
                .await;

            let merged = merge_task_results(context.result(), result);
            context.set_result(merged);
        }

        // Phase 2: post-job steps. They get their own token so cleanup still
        // happens after the job was cancelled.
        let post_steps: Vec<_> = context.post_job_steps.drain(..).collect();
        let post_timeout = Duration::from_secs(u64::from(POST_STEP_TIMEOUT_MINUTES) * 60);
        for step in post_steps.into_iter().rev() {
            number += 1;
            if !self.should_run(context, step.as_ref()) {
                self.record_skipped(context, number, step.as_ref(), "An earlier step failed");
                continue;
            }
            context.info(&format!("Running post step: {}", step.display_name()));
            let result = self
                .run_step(
                    context,
                    number,
                    step.as_ref(),
                    step.timeout().unwrap_or(post_timeout),
                    CancellationToken::new(),
                )
                .await;
            if !result.is_success() {
                context.warning(&format!(
                    "Post step '{}' finished with result {}",
                    step.display_name(),
                    result
                ));
            }
        }

        Ok(())
    }

    fn should_run(&self, context: &ExecutionContext, step: &dyn JobStep) -> bool {
        match step.condition() {
            StepCondition::Always => true,
            StepCondition::Success => {
                !context.cancel_token().is_cancelled()
                    && context.result().map_or(true, TaskResult::is_success)
            }
        }
    }

    /// Run one step in its own context and record the outcome.
    async fn run_step(
        &self,
        context: &mut ExecutionContext,
        number: usize,
        step: &dyn JobStep,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> TaskResult {
        let mut step_context = context.create_step_context(number, step.id(), step.display_name());
        let started_at = Utc::now();
        step_context.section(&format!("Run {}", step.display_name()));

        let outcome = self
            .run_step_with_timeout(step, &mut step_context, timeout, cancel)
            .await;

        let (result, error) = match outcome {
            Ok(()) => (step_context.result().unwrap_or(TaskResult::Succeeded), None),
            Err(e) => {
                let error = format!("{:#}", e);
                step_context.error(&error);
                (step_context.result().unwrap_or(TaskResult::Failed), Some(error))
            }
        };
        let message = step_context
            .result_message()
            .map(str::to_string)
            .or(error)
            .map(|m| step_context.secret_masker().mask_secrets(&m));
        step_context.end_section();
        step_context.complete(result, message.as_deref());

        let record = StepRecord {
            number,
            id: step.id().to_string(),
            name: step.display_name().to_string(),
            result,
            message,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            log_file: step_context.log_file(),
        };
        context.global_mut().step_records.push(record);

        context.info(&format!(
            "Step '{}' completed with result {}",
            step.display_name(),
            result
        ));
        result
    }

    async fn run_step_with_timeout(
        &self,
        step: &dyn JobStep,
        context: &mut ExecutionContext,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            result = step.run_async(context) => result,
            _ = tokio::time::sleep(timeout) => {
                context.error(&format!(
                    "The step '{}' has exceeded the maximum execution time of {} minutes.",
                    context.display_name(),
                    timeout.as_secs() / 60
                ));
                context.set_result(TaskResult::Failed);
                anyhow::bail!("Step timed out after {:?}", timeout)
            }
            _ = cancel.cancelled() => {
                context.info("Step cancelled.");
                context.set_result(TaskResult::Canceled);
                anyhow::bail!("Step cancelled")
            }
        }
    }

    fn record_skipped(&self, context: &mut ExecutionContext, number: usize, step: &dyn JobStep, reason: &str) {
        context.global_mut().step_records.push(StepRecord {
            number,
            id: step.id().to_string(),
            name: step.display_name().to_string(),
            result: TaskResult::Skipped,
            message: Some(reason.to_string()),
            started_at: None,
            finished_at: None,
            log_file: None,
        });
    }
}
