// Scheduler: the long-running mode. Sleeps until the next cron instant,
// dispatches a scheduled run and starts over. Missed instants (runner down,
// clock jumps) are not replayed. Expired artifacts are pruned on start and
// after every dispatch.

use anyhow::Result;
use chrono::{DateTime, Utc};
use newsletter_common::constants::return_code;
use newsletter_common::host_context::HostContext;
use newsletter_common::tracing::Tracing;
use newsletter_common::WellKnownDirectory;
use newsletter_plugins::ArtifactStore;
use newsletter_sdk::TraceWriter;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::job_dispatcher::JobDispatcher;
use crate::trigger::TriggerEvaluator;

/// Longest single sleep; the wall clock is re-read after each one.
pub const MAX_SLEEP: Duration = Duration::from_secs(60);

pub struct Scheduler {
    context: Arc<HostContext>,
    evaluator: TriggerEvaluator,
    trace: Tracing,
}

impl Scheduler {
    pub fn new(context: Arc<HostContext>, evaluator: TriggerEvaluator) -> Self {
        let trace = context.get_trace("Scheduler");
        Self {
            context,
            evaluator,
            trace,
        }
    }

    /// Run until shutdown. With `once`, wait for the next instant, run that
    /// job in the foreground and return its exit code.
    pub async fn run(&self, dispatcher: &mut JobDispatcher, once: bool) -> Result<i32> {
        if !self.evaluator.has_schedule() {
            self.trace.warning("The job has no schedule; nothing to wait for.");
            return Ok(return_code::SUCCESS);
        }

        let shutdown_token = self.context.shutdown_token();
        self.prune_artifacts();
        let mut last_due: Option<DateTime<Utc>> = None;

        while !shutdown_token.is_cancelled() {
            dispatcher.reap();

            let now = Utc::now();
            let after = last_due.map_or(now, |due| due.max(now));
            let Some((expression, due)) = self.evaluator.next_fire_after(after) else {
                self.trace.warning("The schedule has no further instants.");
                break;
            };
            self.trace
                .info(&format!("Next run at {} ('{}')", due.to_rfc3339(), expression));

            if !wait_until(&self.context, due, &shutdown_token).await {
                break;
            }
            last_due = Some(due);

            let trigger = self.evaluator.scheduled(&expression, due);
            if once {
                let report = dispatcher.run_now(trigger).await?;
                self.prune_artifacts();
                return Ok(report.exit_code());
            }
            dispatcher.dispatch(trigger);
            self.prune_artifacts();
        }

        if dispatcher.running() > 0 {
            self.trace.info(&format!(
                "Waiting for {} running job(s) to finish",
                dispatcher.running()
            ));
        }
        dispatcher.wait_all().await;
        if let Some(reason) = self.context.shutdown_reason() {
            self.trace.info(&format!("Scheduler stopped ({})", reason));
        }
        Ok(return_code::SUCCESS)
    }

    fn prune_artifacts(&self) {
        let store = ArtifactStore::new(self.context.get_directory(WellKnownDirectory::Artifacts));
        match store.prune(Utc::now()) {
            Ok(removed) if !removed.is_empty() => self
                .trace
                .info(&format!("Pruned {} expired artifact(s)", removed.len())),
            Ok(_) => {}
            Err(e) => self
                .trace
                .warning(&format!("Unable to prune artifacts: {:#}", e)),
        }
    }
}

/// Sleep in slices of at most `MAX_SLEEP` until `due`. Returns false when
/// the token fired first.
pub async fn wait_until(context: &HostContext, due: DateTime<Utc>, token: &CancellationToken) -> bool {
    loop {
        if token.is_cancelled() {
            return false;
        }
        let remaining = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            return true;
        }
        context.delay(next_delay(remaining), token.clone()).await;
    }
}

pub fn next_delay(remaining: Duration) -> Duration {
    remaining.min(MAX_SLEEP)
}
