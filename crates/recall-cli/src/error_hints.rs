//! User-facing hints for common CLI failures.

use anyhow::Error;
use recall_core::error::{AppError, find_app_error};

const HINT_ENTRY_NOT_FOUND: &str =
    "hint: list positions and ids with 'recall show <category> --all'";
const HINT_AMBIGUOUS_REF: &str = "hint: use more characters of the id, or the entry's position";
const HINT_IDEA_NOT_FOUND: &str = "hint: list tracked ideas with 'recall idea list'";
const HINT_TASK_NOT_FOUND: &str = "hint: list configured tasks with 'recall tasks list'";
const HINT_TASK_CONFIG: &str = "hint: fix the tasks file, then re-check with 'recall tasks check'";
const HINT_SCHEDULER_BUSY: &str =
    "hint: another 'recall tasks run' is in progress; wait for it to finish";
const HINT_TASKS_FILE_MISSING: &str =
    "hint: create the tasks file, or point at one with 'recall tasks --tasks <FILE> ...'";
const HINT_CONFIG_FILE: &str = "hint: check the file shown by 'recall config path'";

pub fn suggest_fix(err: &Error) -> Option<String> {
    if let Some(app_err) = find_app_error(err) {
        let hint = match app_err {
            AppError::EntryNotFound { .. } => Some(HINT_ENTRY_NOT_FOUND),
            AppError::Validation(message) if message.contains("ambiguous") => {
                Some(HINT_AMBIGUOUS_REF)
            }
            AppError::IdeaNotFound(_) => Some(HINT_IDEA_NOT_FOUND),
            AppError::TaskNotFound(_) => Some(HINT_TASK_NOT_FOUND),
            AppError::Config(_) => Some(HINT_TASK_CONFIG),
            AppError::SchedulerBusy(_) => Some(HINT_SCHEDULER_BUSY),
            _ => None,
        };
        if let Some(hint) = hint {
            return Some(hint.to_string());
        }
    }

    let chain_text = err
        .chain()
        .map(|cause| cause.to_string().to_lowercase())
        .collect::<Vec<_>>()
        .join(" | ");

    if chain_text.contains("failed to read tasks file") {
        return Some(HINT_TASKS_FILE_MISSING.to_string());
    }
    if chain_text.contains("failed to parse config") || chain_text.contains("invalid config") {
        return Some(HINT_CONFIG_FILE.to_string());
    }

    None
}
