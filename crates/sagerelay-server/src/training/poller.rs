//! Training job poller
//!
//! A detached state machine per job transaction: Submitted → InProgress →
//! {Completed | Failed | TimedOut}. The loop runs on its own task with its
//! own lifetime; the submitting request has long since been answered by the
//! time anything here happens.

use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::notify::{Notification, Notifier};
use crate::training::submitter::ComputeBackend;
use crate::training::types::{JobStatus, JobTransaction, RemoteJobState};

/// Start polling a submitted job on a background task.
///
/// The handle is returned for observability only; nothing awaits it on the
/// request path.
pub fn spawn(
    transaction: JobTransaction,
    backend: Arc<dyn ComputeBackend>,
    notifier: Arc<dyn Notifier>,
) -> tokio::task::JoinHandle<JobStatus> {
    tokio::spawn(poll_to_terminal(transaction, backend, notifier))
}

/// Drive one transaction to a terminal state, then dispatch exactly one
/// notification.
///
/// Each tick first checks the runtime budget, so a streak of transient query
/// errors still ends in TimedOut. Transient errors never transition state;
/// the same cadence is simply retried.
pub(crate) async fn poll_to_terminal(
    transaction: JobTransaction,
    backend: Arc<dyn ComputeBackend>,
    notifier: Arc<dyn Notifier>,
) -> JobStatus {
    let started = Instant::now();
    let mut detail: Option<String> = None;

    info!(
        job_name = %transaction.job_name,
        poll_interval_secs = transaction.poll_interval.as_secs(),
        max_runtime_secs = transaction.max_runtime.as_secs(),
        "Polling training job"
    );

    let terminal = loop {
        sleep(transaction.poll_interval).await;

        if started.elapsed() >= transaction.max_runtime {
            warn!(
                job_name = %transaction.job_name,
                "Maximum runtime exceeded without a terminal remote state"
            );
            break JobStatus::TimedOut;
        }

        match backend.training_job_status(&transaction.job_name).await {
            Ok(remote) => match remote.state {
                RemoteJobState::Completed => break JobStatus::Completed,
                RemoteJobState::Failed => {
                    detail = remote.failure_reason;
                    break JobStatus::Failed;
                },
                RemoteJobState::InProgress => {
                    debug!(job_name = %transaction.job_name, "Training job still in progress");
                },
            },
            Err(e) => {
                warn!(
                    job_name = %transaction.job_name,
                    error = %e,
                    "Transient error querying job status, will retry"
                );
            },
        }
    };

    info!(
        job_name = %transaction.job_name,
        status = %terminal,
        "Training job reached terminal state"
    );

    let notification = Notification {
        recipient: transaction.recipient.clone(),
        job_name: transaction.job_name.clone(),
        model_name: transaction.model_name.clone(),
        status: terminal,
        detail,
    };

    if let Err(e) = notifier.notify(&notification).await {
        error!(
            job_name = %transaction.job_name,
            error = %e,
            "Failed to deliver terminal-state notification"
        );
    }

    terminal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::submitter::TrainingJobSpec;
    use crate::training::types::RemoteJobStatus;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<RemoteJobStatus>>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<RemoteJobStatus>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ComputeBackend for ScriptedBackend {
        async fn create_training_job(&self, _spec: &TrainingJobSpec) -> Result<()> {
            Ok(())
        }

        async fn training_job_status(&self, _job_name: &str) -> Result<RemoteJobStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("status script exhausted")))
        }
    }

    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                Err(anyhow!("smtp unavailable"))
            } else {
                Ok(())
            }
        }
    }

    fn transaction(max_runtime_secs: u64) -> JobTransaction {
        JobTransaction {
            job_name: "churn-1724846400000".to_string(),
            model_name: "churn".to_string(),
            recipient: "user@example.com".to_string(),
            max_runtime: Duration::from_secs(max_runtime_secs),
            poll_interval: Duration::from_secs(30),
        }
    }

    fn in_progress() -> Result<RemoteJobStatus> {
        Ok(RemoteJobStatus {
            state: RemoteJobState::InProgress,
            failure_reason: None,
        })
    }

    fn completed() -> Result<RemoteJobStatus> {
        Ok(RemoteJobStatus {
            state: RemoteJobState::Completed,
            failure_reason: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_and_notifies_once() {
        let backend = ScriptedBackend::new(vec![in_progress(), in_progress(), completed()]);
        let notifier = RecordingNotifier::new();

        let status =
            poll_to_terminal(transaction(12 * 3600), backend.clone(), notifier.clone()).await;

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(backend.call_count(), 3);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, JobStatus::Completed);
        assert_eq!(sent[0].job_name, "churn-1724846400000");
        assert_eq!(sent[0].model_name, "churn");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_carries_upstream_detail() {
        let backend = ScriptedBackend::new(vec![Ok(RemoteJobStatus {
            state: RemoteJobState::Failed,
            failure_reason: Some("AlgorithmError: bad label column".to_string()),
        })]);
        let notifier = RecordingNotifier::new();

        let status =
            poll_to_terminal(transaction(12 * 3600), backend.clone(), notifier.clone()).await;

        assert_eq!(status, JobStatus::Failed);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].detail.as_deref(),
            Some("AlgorithmError: bad label column")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_do_not_transition() {
        // Three timeouts in a row, then a successful InProgress, then done.
        let backend = ScriptedBackend::new(vec![
            Err(anyhow!("connect timeout")),
            Err(anyhow!("connect timeout")),
            Err(anyhow!("connect timeout")),
            in_progress(),
            completed(),
        ]);
        let notifier = RecordingNotifier::new();

        let status =
            poll_to_terminal(transaction(12 * 3600), backend.clone(), notifier.clone()).await;

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(backend.call_count(), 5);
        // No notification fired for the transient errors.
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_even_when_every_query_errors() {
        // Budget of 90s with a 30s cadence: two queries run, the third tick
        // crosses the budget before querying.
        let backend = ScriptedBackend::new(vec![
            Err(anyhow!("connect timeout")),
            Err(anyhow!("connect timeout")),
        ]);
        let notifier = RecordingNotifier::new();

        let status = poll_to_terminal(transaction(90), backend.clone(), notifier.clone()).await;

        assert_eq!(status, JobStatus::TimedOut);
        assert_eq!(backend.call_count(), 2);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, JobStatus::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_query_after_terminal_state() {
        let backend = ScriptedBackend::new(vec![completed()]);
        let notifier = RecordingNotifier::new();

        let status =
            poll_to_terminal(transaction(12 * 3600), backend.clone(), notifier.clone()).await;

        assert_eq!(status, JobStatus::Completed);
        // Exactly one query: the loop stopped at the terminal transition.
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_failure_is_swallowed() {
        let backend = ScriptedBackend::new(vec![completed()]);
        let notifier = RecordingNotifier::failing();

        let status =
            poll_to_terminal(transaction(12 * 3600), backend.clone(), notifier.clone()).await;

        // Delivery failed but the transaction still ends in its terminal state.
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(notifier.sent().len(), 1);
    }
}
