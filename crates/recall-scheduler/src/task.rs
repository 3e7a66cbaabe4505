//! Task definitions and the declarative tasks file.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveTime, Weekday};
use recall_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::dag::TaskGraph;

/// When a task becomes due on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    /// Never implicitly due; runs only when triggered.
    OnDemand,
    /// Due once per cycle, right after any other task succeeds.
    AfterAny,
}

impl Schedule {
    pub fn is_periodic(self) -> bool {
        !matches!(self, Self::OnDemand | Self::AfterAny)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::OnDemand => "on_demand",
            Self::AfterAny => "after_any",
        };
        f.write_str(label)
    }
}

/// A validated, immutable unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDefinition {
    pub id: String,
    /// Shell command line, run with `sh -c`.
    pub command: String,
    pub schedule: Schedule,
    pub time: NaiveTime,
    /// Days the task may run on. Empty means every day.
    pub weekdays: Vec<Weekday>,
    pub day_of_month: u32,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub depends_on: Vec<String>,
    pub notify: bool,
    pub working_dir: Option<PathBuf>,
    pub description: Option<String>,
}

impl TaskDefinition {
    pub fn runs_on(&self, weekday: Weekday) -> bool {
        self.weekdays.is_empty() || self.weekdays.contains(&weekday)
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TasksFile {
    #[serde(default)]
    tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTask {
    id: String,
    command: String,
    schedule: Schedule,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    weekdays: Vec<String>,
    #[serde(default)]
    day_of_month: Option<u32>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    notify: bool,
    #[serde(default)]
    working_dir: Option<PathBuf>,
    #[serde(default)]
    description: Option<String>,
}

/// Parse and validate a tasks file.
///
/// Every problem is an [`AppError::Config`]: nothing from a rejected file is
/// ever scheduled. Tasks are returned in dependency order.
pub fn load_config(source: &str, default_timeout: Duration) -> Result<Vec<TaskDefinition>> {
    let file: TasksFile = toml::from_str(source)
        .map_err(|err| AppError::config(err.to_string().trim_end().to_string()))?;

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(file.tasks.len());
    for raw in file.tasks {
        let task = validate_task(raw, default_timeout)?;
        if !seen.insert(task.id.clone()) {
            return Err(AppError::config(format!("duplicate task id '{}'", task.id)).into());
        }
        tasks.push(task);
    }

    for task in &tasks {
        for dep in &task.depends_on {
            if !seen.contains(dep) {
                return Err(AppError::config(format!(
                    "task '{}' depends on unknown task '{dep}'",
                    task.id
                ))
                .into());
            }
        }
    }

    let order = TaskGraph::new(&tasks).topological_order()?;
    let mut slots: Vec<Option<TaskDefinition>> = tasks.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect())
}

pub fn load_config_file(path: &Path, default_timeout: Duration) -> Result<Vec<TaskDefinition>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tasks file: {}", path.display()))?;
    load_config(&source, default_timeout)
        .with_context(|| format!("Failed to load tasks file: {}", path.display()))
}

fn validate_task(raw: RawTask, default_timeout: Duration) -> Result<TaskDefinition> {
    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err(AppError::config("task id must not be empty").into());
    }
    if raw.command.trim().is_empty() {
        return Err(AppError::config(format!("task '{id}' has an empty command")).into());
    }

    let time = match raw.time.as_deref() {
        Some(text) => NaiveTime::parse_from_str(text.trim(), "%H:%M").map_err(|_| {
            AppError::config(format!("task '{id}': time '{text}' is not HH:MM"))
        })?,
        None => NaiveTime::MIN,
    };

    let weekdays = raw
        .weekdays
        .iter()
        .map(|day| {
            day.trim().parse::<Weekday>().map_err(|_| {
                AppError::config(format!("task '{id}': unknown weekday '{day}'"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let day_of_month = match (raw.schedule, raw.day_of_month) {
        (Schedule::Monthly, Some(day)) if (1..=31).contains(&day) => day,
        (Schedule::Monthly, None) => 1,
        (Schedule::Monthly, Some(day)) => {
            return Err(AppError::config(format!(
                "task '{id}': day_of_month {day} is outside 1-31"
            ))
            .into());
        }
        (schedule, Some(_)) => {
            return Err(AppError::config(format!(
                "task '{id}': day_of_month only applies to monthly tasks, not {schedule}"
            ))
            .into());
        }
        (_, None) => 1,
    };

    let timeout = match raw.timeout_secs {
        Some(0) => {
            return Err(AppError::config(format!("task '{id}': timeout_secs must be > 0")).into());
        }
        Some(secs) => Duration::from_secs(secs),
        None => default_timeout,
    };

    if raw.depends_on.iter().any(|dep| dep == &id) {
        return Err(AppError::config(format!("task '{id}' depends on itself")).into());
    }

    Ok(TaskDefinition {
        command: raw.command,
        schedule: raw.schedule,
        time,
        weekdays,
        day_of_month,
        timeout,
        depends_on: raw.depends_on,
        notify: raw.notify,
        working_dir: raw.working_dir,
        description: raw.description.filter(|d| !d.trim().is_empty()),
        id,
    })
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
