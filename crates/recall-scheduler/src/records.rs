//! Persisted per-task run state.
//!
//! Stored in `{state_dir}/run_state.toml` and rewritten atomically after
//! every terminal run, so a crash leaves either the old or the new file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const RUN_STATE_FILE: &str = "run_state.toml";

/// Terminal state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
}

impl RunOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
            Self::Skipped => "SKIPPED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<RunOutcome>,
}

/// Task id to [`RunRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecords {
    #[serde(default)]
    tasks: BTreeMap<String, RunRecord>,
}

impl RunRecords {
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join(RUN_STATE_FILE)
    }

    /// Missing file means no task has ever run.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run state: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse run state: {}", path.display()))
    }

    /// Write to a sibling temp file, sync, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .with_context(|| format!("Run state path has no parent: {}", path.display()))?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state dir: {}", dir.display()))?;

        let content = toml::to_string_pretty(self).context("Failed to serialize run state")?;
        let tmp = path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("Failed to sync {}", tmp.display()))?;
        }
        fs::rename(&tmp, path).with_context(|| {
            format!(
                "Failed to replace run state {} with {}",
                path.display(),
                tmp.display()
            )
        })?;
        debug!(path = %path.display(), "saved run state");
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Option<&RunRecord> {
        self.tasks.get(task_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RunRecord)> {
        self.tasks.iter().map(|(id, record)| (id.as_str(), record))
    }

    pub fn last_outcome(&self, task_id: &str) -> Option<RunOutcome> {
        self.get(task_id).and_then(|record| record.last_outcome)
    }

    /// Fold a terminal run into the task's record.
    ///
    /// Timestamps only move forward. A skipped run never started, so it
    /// touches `last_outcome` alone.
    pub fn record(&mut self, task_id: &str, started_at: NaiveDateTime, outcome: RunOutcome) {
        let record = self.tasks.entry(task_id.to_string()).or_default();
        record.last_outcome = Some(outcome);
        if outcome == RunOutcome::Skipped {
            return;
        }
        record.last_attempt = Some(advance(record.last_attempt, started_at));
        if outcome == RunOutcome::Succeeded {
            record.last_success = Some(advance(record.last_success, started_at));
        }
    }
}

fn advance(current: Option<NaiveDateTime>, candidate: NaiveDateTime) -> NaiveDateTime {
    current.map_or(candidate, |current| current.max(candidate))
}
