//! Training job domain types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle state of one job transaction.
///
/// Transitions are monotonic: Submitted → InProgress → one of the terminal
/// states. Once terminal, no further status query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Remote job created, no status observed yet.
    Submitted,
    /// Remote reports the job is still running.
    InProgress,
    /// Remote job finished successfully.
    Completed,
    /// Remote job failed.
    Failed,
    /// Local runtime budget exceeded without a terminal remote state.
    TimedOut,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "Submitted",
            JobStatus::InProgress => "InProgress",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::TimedOut => "TimedOut",
        }
    }

    /// Returns true if no further transition may occur from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by the remote compute service for a training job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobState {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RemoteJobStatus {
    pub state: RemoteJobState,
    pub failure_reason: Option<String>,
}

/// One end-to-end training submission, created after the remote job exists
/// and dropped when polling reaches a terminal state.
#[derive(Debug, Clone)]
pub struct JobTransaction {
    pub job_name: String,
    pub model_name: String,
    pub recipient: String,
    pub max_runtime: Duration,
    pub poll_interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Submitted.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(JobStatus::TimedOut.to_string(), "TimedOut");
    }
}
