use thiserror::Error;

/// Why one verification task did not pass.
///
/// Recorded against the task that produced it; sibling tasks keep running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskExecutionFailure {
    #[error("task {task} has no command configured")]
    EmptyCommand { task: String },

    #[error("task {task} could not prepare {path}: {reason}")]
    Workspace {
        task: String,
        path: String,
        reason: String,
    },

    #[error("failed to spawn '{program}' for task {task}: {reason}")]
    Spawn {
        task: String,
        program: String,
        reason: String,
    },

    #[error("task {task} timed out after {timeout_secs}s")]
    Timeout { task: String, timeout_secs: u64 },

    #[error("task {task} exited with {}{}", exit_label(*code), stderr_suffix(stderr_tail))]
    NonZeroExit {
        task: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("task {task} aborted: {reason}")]
    Aborted { task: String, reason: String },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {}", tail)
    }
}

impl TaskExecutionFailure {
    pub fn task(&self) -> &str {
        match self {
            Self::EmptyCommand { task }
            | Self::Workspace { task, .. }
            | Self::Spawn { task, .. }
            | Self::Timeout { task, .. }
            | Self::NonZeroExit { task, .. }
            | Self::Aborted { task, .. } => task,
        }
    }

    /// Whether another attempt could succeed. A missing command or program stays missing.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::EmptyCommand { .. } | Self::Spawn { .. })
    }
}
