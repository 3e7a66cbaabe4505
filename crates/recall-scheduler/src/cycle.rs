//! One scheduler pass over the task list.
//!
//! Tasks start in dependency order as soon as every dependency is settled,
//! bounded by a semaphore of `max_concurrent` permits. Each terminal run is
//! folded into the run records and persisted before anything else happens,
//! so a crash never loses a completed run.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use recall_core::error::AppError;
use recall_lock::{FileLock, LockAttempt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dag::TaskGraph;
use crate::due::due;
use crate::exec::{ShellExecutor, TaskExecutor};
use crate::notify::{LogNotifier, Notifier};
use crate::records::{RunOutcome, RunRecords};
use crate::task::{Schedule, TaskDefinition};

pub const DEFAULT_MAX_CONCURRENT: usize = 2;
const LOCKS_DIR: &str = "locks";
const SCHEDULER_LOCK: &str = "scheduler";
const LOGS_DIR: &str = "logs";
const RUN_LOG_FILE: &str = "task_runs.log";

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// One execution attempt of one task. Skipped tasks get a run too, with
/// equal start and end times and no log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Run {
    pub task_id: String,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub outcome: RunOutcome,
    pub log_path: Option<PathBuf>,
    /// Failure, timeout or skip reason.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Terminal runs in completion order.
    pub runs: Vec<Run>,
    /// Tasks that were neither due nor triggered.
    pub not_due: Vec<String>,
}

impl CycleReport {
    pub fn outcome_of(&self, task_id: &str) -> Option<RunOutcome> {
        self.runs
            .iter()
            .find(|run| run.task_id == task_id)
            .map(|run| run.outcome)
    }

    pub fn count(&self, outcome: RunOutcome) -> usize {
        self.runs.iter().filter(|run| run.outcome == outcome).count()
    }

    /// Any run FAILED or TIMED_OUT.
    pub fn has_failures(&self) -> bool {
        self.runs.iter().any(|run| run.outcome.is_failure())
    }
}

/// Per-task state within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// `after_any` task waiting for some other task to succeed.
    Pending,
    Due,
    Running,
    Finished(RunOutcome),
    /// Neither due nor triggered; left untouched this cycle.
    NotDue,
}

enum Verdict {
    Ready,
    Wait,
    Blocked(String),
}

struct Finished {
    index: usize,
    run: Run,
}

pub struct Scheduler {
    /// Topologically ordered: every dependency precedes its dependents.
    tasks: Vec<Arc<TaskDefinition>>,
    graph: TaskGraph,
    state_dir: PathBuf,
    max_concurrent: usize,
    executor: Arc<dyn TaskExecutor>,
    notifier: Arc<dyn Notifier>,
    clock: Clock,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.len())
            .field("state_dir", &self.state_dir)
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

impl Scheduler {
    /// Fails with [`AppError::Config`] if the tasks contain a dependency cycle.
    pub fn new(tasks: Vec<TaskDefinition>, state_dir: impl Into<PathBuf>) -> Result<Self> {
        let order = TaskGraph::new(&tasks).topological_order()?;
        let mut slots: Vec<Option<TaskDefinition>> = tasks.into_iter().map(Some).collect();
        let ordered: Vec<TaskDefinition> = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();

        Ok(Self {
            graph: TaskGraph::new(&ordered),
            tasks: ordered.into_iter().map(Arc::new).collect(),
            state_dir: state_dir.into(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            executor: Arc::new(ShellExecutor),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(|| Local::now().naive_local()),
        })
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Clock used for run start/end times.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.iter().map(|task| task.as_ref())
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn records_path(&self) -> PathBuf {
        RunRecords::path_in(&self.state_dir)
    }

    pub fn load_records(&self) -> Result<RunRecords> {
        RunRecords::load(&self.records_path())
    }

    /// Tasks whose schedule makes them due at `now`.
    pub fn due_tasks(&self, now: NaiveDateTime) -> Result<Vec<&TaskDefinition>> {
        let records = self.load_records()?;
        Ok(self.tasks().filter(|task| due(task, now, &records)).collect())
    }

    /// Run every task due at `now`, plus any `after_any` task released by a
    /// success. Task failures are reported in the result, not returned as
    /// errors.
    pub async fn run_cycle(&self, now: NaiveDateTime) -> Result<CycleReport> {
        self.run_locked("run cycle", |task, records| {
            if due(task, now, records) {
                TaskState::Due
            } else {
                idle_state(task)
            }
        })
        .await
    }

    /// Run the named tasks now regardless of their schedule. Dependency and
    /// `after_any` rules apply as in a normal cycle.
    pub async fn trigger(&self, ids: &[String]) -> Result<CycleReport> {
        if let Some(unknown) = ids
            .iter()
            .find(|id| !self.tasks.iter().any(|task| &task.id == *id))
        {
            return Err(AppError::TaskNotFound(unknown.clone()).into());
        }

        self.run_locked("manual trigger", |task, _| {
            if ids.contains(&task.id) {
                TaskState::Due
            } else {
                idle_state(task)
            }
        })
        .await
    }

    async fn run_locked(
        &self,
        reason: &str,
        initial: impl Fn(&TaskDefinition, &RunRecords) -> TaskState,
    ) -> Result<CycleReport> {
        let _lock = self.acquire_lock(reason)?;
        let records_path = self.records_path();
        let mut records = RunRecords::load(&records_path)?;

        let mut states: Vec<TaskState> = self
            .tasks
            .iter()
            .map(|task| initial(task, &records))
            .collect();
        for (task, state) in self.tasks.iter().zip(&states) {
            debug!(task = %task.id, ?state, "initial task state");
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set: JoinSet<Finished> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, usize> = HashMap::new();
        // Notifications run beside dispatch and are drained before returning.
        let mut notices: JoinSet<()> = JoinSet::new();
        let mut report = CycleReport::default();

        loop {
            // Start or skip every due task whose dependencies have settled.
            // One sweep in topological order settles whole skip chains.
            let mut changed = true;
            while changed {
                changed = false;
                for index in 0..self.tasks.len() {
                    if states[index] != TaskState::Due {
                        continue;
                    }
                    match self.verdict(index, &states, &records) {
                        Verdict::Wait => {}
                        Verdict::Ready => {
                            let id = self.spawn_run(index, &mut join_set, &semaphore);
                            in_flight.insert(id, index);
                            states[index] = TaskState::Running;
                            changed = true;
                        }
                        Verdict::Blocked(reason) => {
                            let now = (self.clock)();
                            let run = Run {
                                task_id: self.tasks[index].id.clone(),
                                started_at: now,
                                finished_at: now,
                                outcome: RunOutcome::Skipped,
                                log_path: None,
                                error: Some(reason),
                            };
                            states[index] = TaskState::Finished(RunOutcome::Skipped);
                            self.finish(
                                index,
                                run,
                                &mut records,
                                &records_path,
                                &mut notices,
                                &mut report,
                            )?;
                            changed = true;
                        }
                    }
                }
            }

            if join_set.is_empty() {
                if !states.contains(&TaskState::Pending) {
                    break;
                }
                // Nothing succeeded to release the after_any tasks.
                for state in states.iter_mut().filter(|s| **s == TaskState::Pending) {
                    *state = TaskState::NotDue;
                }
                continue;
            }

            let Some(joined) = join_set.join_next_with_id().await else {
                break;
            };
            let Finished { index, run } = match joined {
                Ok((id, finished)) => {
                    in_flight.remove(&id);
                    finished
                }
                Err(join_err) => {
                    let Some(index) = in_flight.remove(&join_err.id()) else {
                        warn!(error = %join_err, "untracked task run ended abnormally");
                        continue;
                    };
                    let now = (self.clock)();
                    Finished {
                        index,
                        run: Run {
                            task_id: self.tasks[index].id.clone(),
                            started_at: now,
                            finished_at: now,
                            outcome: RunOutcome::Failed,
                            log_path: None,
                            error: Some(format!("executor aborted: {join_err}")),
                        },
                    }
                }
            };

            let succeeded = run.outcome == RunOutcome::Succeeded;
            states[index] = TaskState::Finished(run.outcome);
            self.finish(
                index,
                run,
                &mut records,
                &records_path,
                &mut notices,
                &mut report,
            )?;

            if succeeded {
                for (task, state) in self.tasks.iter().zip(states.iter_mut()) {
                    if *state == TaskState::Pending {
                        debug!(task = %task.id, "after_any task released");
                        *state = TaskState::Due;
                    }
                }
            }
        }

        while let Some(joined) = notices.join_next().await {
            if let Err(join_err) = joined {
                warn!(error = %join_err, "notification task ended abnormally");
            }
        }

        report.not_due = self
            .tasks
            .iter()
            .zip(&states)
            .filter(|(_, state)| **state == TaskState::NotDue)
            .map(|(task, _)| task.id.clone())
            .collect();

        info!(
            succeeded = report.count(RunOutcome::Succeeded),
            failed = report.count(RunOutcome::Failed),
            timed_out = report.count(RunOutcome::TimedOut),
            skipped = report.count(RunOutcome::Skipped),
            not_due = report.not_due.len(),
            "cycle finished"
        );
        Ok(report)
    }

    fn verdict(&self, index: usize, states: &[TaskState], records: &RunRecords) -> Verdict {
        for &dep in self.graph.dependencies(index) {
            let dep_id = &self.tasks[dep].id;
            match states[dep] {
                TaskState::Finished(RunOutcome::Succeeded) => {}
                TaskState::Finished(outcome) => {
                    return Verdict::Blocked(format!("dependency '{dep_id}' {outcome}"));
                }
                // Not part of this cycle: trust its last recorded run.
                TaskState::NotDue => {
                    if records.last_outcome(dep_id) != Some(RunOutcome::Succeeded) {
                        return Verdict::Blocked(format!(
                            "dependency '{dep_id}' has no successful run"
                        ));
                    }
                }
                TaskState::Pending | TaskState::Due | TaskState::Running => return Verdict::Wait,
            }
        }
        Verdict::Ready
    }

    fn spawn_run(
        &self,
        index: usize,
        join_set: &mut JoinSet<Finished>,
        semaphore: &Arc<Semaphore>,
    ) -> tokio::task::Id {
        let task = Arc::clone(&self.tasks[index]);
        let executor = Arc::clone(&self.executor);
        let semaphore = Arc::clone(semaphore);
        let clock = Arc::clone(&self.clock);
        let log_dir = self.state_dir.join(LOGS_DIR).join(&task.id);

        join_set
            .spawn(async move {
                // The semaphore is never closed; a failed acquire only drops the bound.
                let _permit = semaphore.acquire_owned().await.ok();
                let started_at = clock();
                let log_path =
                    log_dir.join(format!("{}.log", started_at.format("%Y%m%d-%H%M%S")));
                info!(task = %task.id, log = %log_path.display(), "task started");

                let result =
                    tokio::time::timeout(task.timeout, executor.execute(&task, &log_path)).await;
                let (outcome, error) = match result {
                    Ok(Ok(())) => (RunOutcome::Succeeded, None),
                    Ok(Err(err)) => (RunOutcome::Failed, Some(format!("{err:#}"))),
                    Err(_) => {
                        let timeout = AppError::Timeout {
                            task: task.id.clone(),
                            secs: task.timeout.as_secs(),
                        };
                        (RunOutcome::TimedOut, Some(timeout.to_string()))
                    }
                };

                Finished {
                    index,
                    run: Run {
                        task_id: task.id.clone(),
                        started_at,
                        finished_at: clock(),
                        outcome,
                        log_path: Some(log_path),
                        error,
                    },
                }
            })
            .id()
    }

    fn finish(
        &self,
        index: usize,
        run: Run,
        records: &mut RunRecords,
        records_path: &Path,
        notices: &mut JoinSet<()>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let task = &self.tasks[index];
        records.record(&task.id, run.started_at, run.outcome);
        records.save(records_path)?;

        match run.outcome {
            RunOutcome::Succeeded => info!(task = %task.id, "task succeeded"),
            RunOutcome::Skipped => info!(
                task = %task.id,
                reason = run.error.as_deref().unwrap_or_default(),
                "task skipped"
            ),
            RunOutcome::Failed | RunOutcome::TimedOut => error!(
                task = %task.id,
                outcome = %run.outcome,
                started_at = %run.started_at,
                finished_at = %run.finished_at,
                log = ?run.log_path,
                error = run.error.as_deref().unwrap_or_default(),
                "task did not succeed"
            ),
        }

        if let Err(err) = self.append_run_log(&run) {
            warn!(task = %task.id, error = %format!("{err:#}"), "failed to append run log");
        }
        if task.notify {
            let notifier = Arc::clone(&self.notifier);
            let run = run.clone();
            notices.spawn(async move {
                if let Err(err) = notifier.notify(&run).await {
                    warn!(task = %run.task_id, error = %format!("{err:#}"), "notification failed");
                }
            });
        }

        report.runs.push(run);
        Ok(())
    }

    fn append_run_log(&self, run: &Run) -> Result<()> {
        let path = self.state_dir.join(RUN_LOG_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        writeln!(
            file,
            "{} | {} | {}",
            run.finished_at.format("%Y-%m-%d %H:%M:%S"),
            run.task_id,
            run.outcome
        )
        .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn acquire_lock(&self, reason: &str) -> Result<FileLock> {
        let locks_dir = self.state_dir.join(LOCKS_DIR);
        match recall_lock::try_acquire(&locks_dir, SCHEDULER_LOCK, reason)? {
            LockAttempt::Acquired(lock) => Ok(lock),
            LockAttempt::Held(holder) => Err(AppError::SchedulerBusy(holder).into()),
        }
    }
}

fn idle_state(task: &TaskDefinition) -> TaskState {
    if task.schedule == Schedule::AfterAny {
        TaskState::Pending
    } else {
        TaskState::NotDue
    }
}

#[cfg(test)]
#[path = "cycle_tests.rs"]
mod tests;
