//! Running a task's command.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use recall_core::error::AppError;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::task::TaskDefinition;

/// Time between SIGTERM and SIGKILL when a run is abandoned.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// Executes one run of a task.
///
/// Returning `Err` marks the run FAILED. The scheduler enforces timeouts by
/// dropping the returned future, so implementations must release anything
/// they hold when dropped mid-await.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskDefinition, log_path: &Path) -> Result<()>;
}

/// Runs `sh -c <command>` in its own process group with stdout and stderr
/// appended to the run's log file. Exit status 0 is success.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

#[async_trait]
impl TaskExecutor for ShellExecutor {
    async fn execute(&self, task: &TaskDefinition, log_path: &Path) -> Result<()> {
        let mut log = open_log(log_path)?;
        writeln!(
            log,
            "# {} | {} | {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            task.id,
            task.command
        )
        .with_context(|| format!("Failed to write run log: {}", log_path.display()))?;

        let stderr = log
            .try_clone()
            .with_context(|| format!("Failed to clone run log: {}", log_path.display()))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&task.command)
            .env("RECALL_TASK_ID", &task.id)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr));
        if let Some(dir) = &task.working_dir {
            cmd.current_dir(dir);
        }

        // New process group so abandonment reaches everything the shell forked.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn task '{}'", task.id))?;
        let mut guard = ProcessGroupGuard::new(&task.id, child.id());

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for task '{}'", task.id))?;
        guard.disarm();

        if status.success() {
            debug!(task = %task.id, "command exited successfully");
            return Ok(());
        }

        let message = match status.code() {
            Some(code) => format!("exited with code {code}"),
            None => "terminated by signal".to_string(),
        };
        Err(AppError::Execution {
            task: task.id.clone(),
            message,
        }
        .into())
    }
}

fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log dir: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open run log: {}", path.display()))
}

/// Terminates a task's process group if the run is abandoned before the
/// shell exits (timeout or scheduler shutdown).
struct ProcessGroupGuard {
    task: String,
    pgid: Option<i32>,
}

impl ProcessGroupGuard {
    fn new(task: &str, pid: Option<u32>) -> Self {
        Self {
            task: task.to_string(),
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        warn!(task = %self.task, pgid, "terminating abandoned task process group");

        // SAFETY: kill() only sends a signal. The negative pid targets the
        // group created by process_group(0), whose id is the shell's pid.
        unsafe {
            libc::kill(-pgid, libc::SIGTERM);
        }

        // Drop cannot await; escalate from a detached thread.
        std::thread::spawn(move || {
            std::thread::sleep(TERM_GRACE);
            // SAFETY: as above. ESRCH when the group already exited is harmless.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        });
    }
}
