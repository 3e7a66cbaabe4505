//! Global configuration for recall (`~/.config/recall/config.toml`).
//!
//! Holds user-level settings for both components:
//! - where memory category logs live
//! - where the scheduler reads task definitions and persists run state
//! - scheduler concurrency, default timeout and notification command

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths;

/// Default number of tasks the scheduler runs at the same time.
const DEFAULT_MAX_CONCURRENT: usize = 2;
/// Default per-task timeout when a task does not set `timeout_secs`.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySection {
    /// Directory holding one markdown log per category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Declarative task definitions (TOML).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_file: Option<PathBuf>,
    /// Run records, run logs and the scheduler lock live here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Shell command run when a task with `notify = true` finishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_command: Option<String>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tasks_file: None,
            state_dir: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            notify_command: None,
        }
    }
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl GlobalConfig {
    /// Load the global config file.
    ///
    /// Returns `Default` if the file does not exist or if the config
    /// directory cannot be determined (e.g., no HOME in containers).
    pub fn load() -> Result<Self> {
        match paths::config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent == 0 {
            bail!("scheduler.max_concurrent must be at least 1");
        }
        if self.scheduler.default_timeout_secs == 0 {
            bail!("scheduler.default_timeout_secs must be at least 1");
        }
        if self
            .scheduler
            .notify_command
            .as_deref()
            .is_some_and(|cmd| cmd.trim().is_empty())
        {
            bail!("scheduler.notify_command must not be empty when set");
        }
        Ok(())
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.memory
            .dir
            .clone()
            .unwrap_or_else(paths::default_memory_dir)
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.scheduler
            .tasks_file
            .clone()
            .unwrap_or_else(paths::default_tasks_file)
    }

    pub fn scheduler_state_dir(&self) -> PathBuf {
        self.scheduler
            .state_dir
            .clone()
            .unwrap_or_else(paths::default_scheduler_state_dir)
    }

    /// Effective configuration with every default path filled in.
    pub fn resolved(&self) -> Self {
        let mut resolved = self.clone();
        resolved.memory.dir = Some(self.memory_dir());
        resolved.scheduler.tasks_file = Some(self.tasks_file());
        resolved.scheduler.state_dir = Some(self.scheduler_state_dir());
        resolved
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = GlobalConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, GlobalConfig::default());
        assert_eq!(config.scheduler.max_concurrent, 2);
        assert_eq!(config.scheduler.default_timeout_secs, 600);
    }

    #[test]
    fn test_load_full_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[memory]
dir = "/data/memories"

[scheduler]
tasks_file = "/data/tasks.toml"
state_dir = "/data/state"
max_concurrent = 4
default_timeout_secs = 30
notify_command = "notify-send recall"
"#,
        )
        .unwrap();

        let config = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(config.memory_dir(), PathBuf::from("/data/memories"));
        assert_eq!(config.tasks_file(), PathBuf::from("/data/tasks.toml"));
        assert_eq!(config.scheduler_state_dir(), PathBuf::from("/data/state"));
        assert_eq!(config.scheduler.max_concurrent, 4);
        assert_eq!(config.scheduler.default_timeout_secs, 30);
        assert_eq!(
            config.scheduler.notify_command.as_deref(),
            Some("notify-send recall")
        );
    }

    #[test]
    fn test_partial_scheduler_section_keeps_defaults() {
        let config: GlobalConfig = toml::from_str("[scheduler]\nmax_concurrent = 1\n").unwrap();
        assert_eq!(config.scheduler.max_concurrent, 1);
        assert_eq!(config.scheduler.default_timeout_secs, 600);
        assert!(config.memory.dir.is_none());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scheduler]\nmax_concurrent = 0\n").unwrap();

        let err = GlobalConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_concurrent"));
    }

    #[test]
    fn test_malformed_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scheduler\n").unwrap();

        let err = GlobalConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_resolved_fills_paths_and_serializes() {
        let resolved = GlobalConfig::default().resolved();
        assert!(resolved.memory.dir.is_some());
        assert!(resolved.scheduler.tasks_file.is_some());
        let text = resolved.to_toml().unwrap();
        assert!(text.contains("[scheduler]"));
        assert!(text.contains("max_concurrent = 2"));
    }
}
