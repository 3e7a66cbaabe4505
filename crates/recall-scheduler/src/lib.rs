//! Idempotent, dependency-aware runner for periodic shell tasks.
//!
//! Tasks come from a declarative TOML file ([`load_config`]); per-task
//! outcomes persist in [`RunRecords`] so repeated or crash-interrupted
//! cycles never redo work that was already recorded.

mod cycle;
mod dag;
mod due;
mod exec;
mod notify;
mod records;
mod task;

pub use cycle::{CycleReport, DEFAULT_MAX_CONCURRENT, Run, Scheduler, TaskState};
pub use dag::TaskGraph;
pub use due::{current_slot, due};
pub use exec::{ShellExecutor, TaskExecutor};
pub use notify::{CommandNotifier, LogNotifier, Notifier};
pub use records::{RUN_STATE_FILE, RunOutcome, RunRecord, RunRecords};
pub use task::{Schedule, TaskDefinition, load_config, load_config_file};
