//! Side-effect notifications for tasks with `notify = true`.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::cycle::Run;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers a notice that a run reached a terminal state.
///
/// Errors are logged by the scheduler and never change the run's outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, run: &Run) -> Result<()>;
}

/// Only writes the notice to the tracing log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, run: &Run) -> Result<()> {
        info!(task = %run.task_id, outcome = %run.outcome, "task notification");
        Ok(())
    }
}

/// Runs a user command (`sh -c`) with the run described in the environment:
/// `RECALL_TASK_ID`, `RECALL_TASK_OUTCOME` and, when the run produced one,
/// `RECALL_TASK_LOG`.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: String,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, run: &Run) -> Result<()> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env("RECALL_TASK_ID", &run.task_id)
            .env("RECALL_TASK_OUTCOME", run.outcome.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(log_path) = &run.log_path {
            cmd.env("RECALL_TASK_LOG", log_path);
        }

        let status = tokio::time::timeout(NOTIFY_TIMEOUT, cmd.status())
            .await
            .with_context(|| {
                format!(
                    "Notify command timed out after {}s",
                    NOTIFY_TIMEOUT.as_secs()
                )
            })?
            .context("Failed to run notify command")?;
        if !status.success() {
            bail!("Notify command exited with {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RunOutcome;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn run(outcome: RunOutcome) -> Run {
        let at = NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Run {
            task_id: "backup".into(),
            started_at: at,
            finished_at: at,
            outcome,
            log_path: Some("/tmp/backup.log".into()),
            error: None,
        }
    }

    #[tokio::test]
    async fn command_notifier_exports_run_details() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("notice.txt");
        let notifier = CommandNotifier::new(format!(
            "echo \"$RECALL_TASK_ID $RECALL_TASK_OUTCOME $RECALL_TASK_LOG\" > '{}'",
            out.display()
        ));

        notifier.notify(&run(RunOutcome::TimedOut)).await.unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text.trim(), "backup TIMED_OUT /tmp/backup.log");
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let notifier = CommandNotifier::new("exit 1");
        assert!(notifier.notify(&run(RunOutcome::Succeeded)).await.is_err());
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        LogNotifier.notify(&run(RunOutcome::Failed)).await.unwrap();
    }
}
