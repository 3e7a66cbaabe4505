use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use recall_config::GlobalConfig;
use recall_core::types::OutputFormat;
use recall_scheduler::{
    CommandNotifier, CycleReport, LogNotifier, Notifier, RunOutcome, Scheduler, ShellExecutor,
    TaskDefinition, load_config_file,
};
use serde::Serialize;
use tracing::debug;

use crate::cli::TaskCommands;

/// Where the scheduler reads tasks and keeps state for this invocation.
pub(crate) struct TaskPaths {
    pub tasks_file: PathBuf,
    pub state_dir: PathBuf,
}

impl TaskPaths {
    pub(crate) fn resolve(
        config: &GlobalConfig,
        tasks: Option<PathBuf>,
        state_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            tasks_file: tasks.unwrap_or_else(|| config.tasks_file()),
            state_dir: state_dir.unwrap_or_else(|| config.scheduler_state_dir()),
        }
    }
}

/// Returns the process exit code.
pub(crate) async fn handle_tasks_command(
    cmd: TaskCommands,
    config: &GlobalConfig,
    paths: &TaskPaths,
    format: OutputFormat,
) -> Result<i32> {
    let default_timeout = Duration::from_secs(config.scheduler.default_timeout_secs);
    let tasks = load_config_file(&paths.tasks_file, default_timeout)?;
    debug!(count = tasks.len(), path = %paths.tasks_file.display(), "loaded tasks");

    let scheduler = build_scheduler(tasks, config, paths)?;
    match cmd {
        TaskCommands::List => handle_list(&scheduler, format)?,
        TaskCommands::Check => handle_check(&scheduler, paths, format)?,
        TaskCommands::Due => handle_due(&scheduler, format)?,
        TaskCommands::Status => handle_status(&scheduler, format)?,
        TaskCommands::Run => {
            let report = scheduler.run_cycle(Local::now().naive_local()).await?;
            return print_report(&report, format);
        }
        TaskCommands::Trigger { ids } => {
            let report = scheduler.trigger(&ids).await?;
            return print_report(&report, format);
        }
    }
    Ok(0)
}

fn build_scheduler(
    tasks: Vec<TaskDefinition>,
    config: &GlobalConfig,
    paths: &TaskPaths,
) -> Result<Scheduler> {
    let notifier: Arc<dyn Notifier> = match &config.scheduler.notify_command {
        Some(command) => Arc::new(CommandNotifier::new(command.clone())),
        None => Arc::new(LogNotifier),
    };
    Ok(Scheduler::new(tasks, &paths.state_dir)?
        .with_max_concurrent(config.scheduler.max_concurrent)
        .with_executor(Arc::new(ShellExecutor))
        .with_notifier(notifier))
}

fn handle_list(scheduler: &Scheduler, format: OutputFormat) -> Result<()> {
    let tasks: Vec<&TaskDefinition> = scheduler.tasks().collect();
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks configured.");
        return Ok(());
    }
    for task in tasks {
        let mut line = format!(
            "{:24} {:10} {}",
            task.id,
            task.schedule.to_string(),
            task.time.format("%H:%M")
        );
        if !task.weekdays.is_empty() {
            let days: Vec<String> = task.weekdays.iter().map(ToString::to_string).collect();
            line.push_str(&format!(" on {}", days.join(",")));
        }
        if !task.depends_on.is_empty() {
            line.push_str(&format!(" after {}", task.depends_on.join(",")));
        }
        if let Some(description) = &task.description {
            line.push_str(&format!(" - {description}"));
        }
        println!("{line}");
    }
    Ok(())
}

fn handle_check(scheduler: &Scheduler, paths: &TaskPaths, format: OutputFormat) -> Result<()> {
    let count = scheduler.tasks().count();
    if format.is_json() {
        println!(
            "{}",
            serde_json::json!({ "valid": true, "tasks": count, "path": paths.tasks_file })
        );
    } else {
        println!("OK: {count} task(s) in {}", paths.tasks_file.display());
    }
    Ok(())
}

fn handle_due(scheduler: &Scheduler, format: OutputFormat) -> Result<()> {
    let due: Vec<&str> = scheduler
        .due_tasks(Local::now().naive_local())?
        .into_iter()
        .map(|task| task.id.as_str())
        .collect();
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&due)?);
    } else if due.is_empty() {
        println!("No tasks due.");
    } else {
        for id in due {
            println!("{id}");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusRow<'a> {
    id: &'a str,
    last_success: Option<String>,
    last_attempt: Option<String>,
    last_outcome: Option<RunOutcome>,
}

fn handle_status(scheduler: &Scheduler, format: OutputFormat) -> Result<()> {
    let records = scheduler.load_records()?;
    let stamp = |ts: Option<chrono::NaiveDateTime>| {
        ts.map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
    };
    let rows: Vec<StatusRow<'_>> = scheduler
        .tasks()
        .map(|task| {
            let record = records.get(&task.id).cloned().unwrap_or_default();
            StatusRow {
                id: &task.id,
                last_success: stamp(record.last_success),
                last_attempt: stamp(record.last_attempt),
                last_outcome: record.last_outcome,
            }
        })
        .collect();

    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in rows {
        println!(
            "{:24} {:10} last success: {:19}  last attempt: {}",
            row.id,
            row.last_outcome
                .map_or_else(|| "never".to_string(), |outcome| outcome.to_string()),
            row.last_success.as_deref().unwrap_or("-"),
            row.last_attempt.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn print_report(report: &CycleReport, format: OutputFormat) -> Result<i32> {
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if report.runs.is_empty() {
        println!("Nothing to run.");
    } else {
        for run in &report.runs {
            let mut line = format!("{:10} {}", run.outcome.to_string(), run.task_id);
            if let Some(error) = &run.error {
                line.push_str(&format!(": {error}"));
            }
            if let Some(log) = &run.log_path {
                if run.outcome.is_failure() {
                    line.push_str(&format!(" (log: {})", log.display()));
                }
            }
            println!("{line}");
        }
    }
    Ok(i32::from(report.has_failures()))
}
