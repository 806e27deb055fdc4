// Step and job results, their merge order and the process exit code each
// job result maps to.

use crate::constants::return_code;
use serde::{Deserialize, Serialize};

/// Ordered by severity: a merge never moves a result to a lower variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskResult {
    Succeeded,
    SucceededWithIssues,
    Failed,
    Canceled,
    Skipped,
}

impl TaskResult {
    pub fn is_success(self) -> bool {
        matches!(self, TaskResult::Succeeded | TaskResult::SucceededWithIssues)
    }

    /// Exit code of `newsletter-runner` for a finished job with this result.
    pub fn to_exit_code(self) -> i32 {
        match self {
            TaskResult::Succeeded | TaskResult::SucceededWithIssues | TaskResult::Skipped => {
                return_code::SUCCESS
            }
            TaskResult::Failed => return_code::JOB_FAILED,
            TaskResult::Canceled => return_code::JOB_CANCELED,
        }
    }
}

impl std::fmt::Display for TaskResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskResult::Succeeded => write!(f, "Succeeded"),
            TaskResult::SucceededWithIssues => write!(f, "SucceededWithIssues"),
            TaskResult::Failed => write!(f, "Failed"),
            TaskResult::Canceled => write!(f, "Canceled"),
            TaskResult::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Merge a step result into the running job result, keeping the worse.
///
/// Once the job is `Canceled` (or `Skipped`) it stays that way; a skipped
/// step never changes an existing result.
pub fn merge_task_results(current: Option<TaskResult>, coming: TaskResult) -> TaskResult {
    match current {
        None => coming,
        Some(current) if current > TaskResult::Failed => current,
        Some(current) if coming == TaskResult::Skipped => current,
        Some(current) => current.max(coming),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_worst() {
        assert_eq!(merge_task_results(None, TaskResult::Failed), TaskResult::Failed);
        assert_eq!(
            merge_task_results(Some(TaskResult::Succeeded), TaskResult::SucceededWithIssues),
            TaskResult::SucceededWithIssues
        );
        assert_eq!(
            merge_task_results(Some(TaskResult::Failed), TaskResult::Succeeded),
            TaskResult::Failed
        );
        assert_eq!(
            merge_task_results(Some(TaskResult::Failed), TaskResult::Canceled),
            TaskResult::Canceled
        );
    }

    #[test]
    fn canceled_is_sticky_and_skipped_is_neutral() {
        assert_eq!(
            merge_task_results(Some(TaskResult::Canceled), TaskResult::Failed),
            TaskResult::Canceled
        );
        assert_eq!(
            merge_task_results(Some(TaskResult::Succeeded), TaskResult::Skipped),
            TaskResult::Succeeded
        );
    }

    #[test]
    fn exit_codes() {
        assert_eq!(TaskResult::Succeeded.to_exit_code(), 0);
        assert_eq!(TaskResult::SucceededWithIssues.to_exit_code(), 0);
        assert_eq!(TaskResult::Failed.to_exit_code(), 1);
        assert_eq!(TaskResult::Canceled.to_exit_code(), 3);
    }

    #[test]
    fn serializes_as_variant_name() {
        assert_eq!(
            serde_json::to_string(&TaskResult::SucceededWithIssues).unwrap(),
            "\"SucceededWithIssues\""
        );
    }
}
