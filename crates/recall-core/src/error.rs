/// Domain errors shared by the memory store and the task scheduler.
///
/// Library code returns `anyhow::Result` and wraps these with `.into()`;
/// callers recover the variant with [`find_app_error`].
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("No entry matching '{reference}' in category '{category}'")]
    EntryNotFound { category: String, reference: String },

    #[error("No idea with id '{0}'")]
    IdeaNotFound(String),

    #[error("Unknown task '{0}'")]
    TaskNotFound(String),

    #[error("Invalid task configuration: {0}")]
    Config(String),

    #[error("Task '{task}' failed: {message}")]
    Execution { task: String, message: String },

    #[error("Task '{task}' timed out after {secs}s")]
    Timeout { task: String, secs: u64 },

    #[error("Scheduler busy: {0}")]
    SchedulerBusy(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Find the first `AppError` anywhere in an error chain.
pub fn find_app_error(err: &anyhow::Error) -> Option<&AppError> {
    err.chain().find_map(|cause| cause.downcast_ref::<AppError>())
}
