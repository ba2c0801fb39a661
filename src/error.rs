//! Public error of async-operation.

use crate::prelude::*;

use std::fmt;
use std::sync::Arc;

/// Outcome stored by a task when it completes.
pub type TaskResult = Result<(), TaskError>;

/// Error enumeration for the completion of an `AsyncTask`.
///
/// The framework itself only ever produces `OperationCanceled`,
/// every other variant is reported by collaborators through `try_complete`.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The task was completed by the cancellation path.
    #[error("The operation was canceled.")]
    OperationCanceled,
    /// The deadline of a timed task elapsed.
    #[error("The operation timed out.")]
    Timeout,
    /// Collaborator failure identified by a numeric code.
    #[error("The operation failed with code {0}.")]
    Code(i32),
    /// Any other collaborator failure.
    #[error("{0}")]
    Other(Arc<anyhow::Error>),
}

impl TaskError {
    /// Wrap an arbitrary error as a collaborator failure.
    pub fn other(error: impl Into<anyhow::Error>) -> Self {
        TaskError::Other(Arc::new(error.into()))
    }

    /// Whether this is the framework's cancellation error.
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::OperationCanceled)
    }
}

impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TaskError::OperationCanceled, TaskError::OperationCanceled) => true,
            (TaskError::Timeout, TaskError::Timeout) => true,
            (TaskError::Code(a), TaskError::Code(b)) => a == b,
            (TaskError::Other(a), TaskError::Other(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for TaskError {}

/// Error enumeration for scheduler construction.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The internal tokio runtime could not be built.
    #[error("Failed to build the tokio runtime.")]
    RuntimeBuild(#[from] std::io::Error),
}

/// Error enumeration for waiting on a task handle.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
pub enum HandleTaskError {
    /// The task did not complete within the allotted time.
    #[error("Waiting for task completion timed out.")]
    WaitTimeout,
}

/// Classification of a failed attempt, supplied by retryable work.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Retryability {
    /// The attempt may be repeated after a delay.
    Retryable,
    /// The failure is final.
    Terminal,
}

impl fmt::Display for Retryability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retryability::Retryable => f.write_str("retryable"),
            Retryability::Terminal => f.write_str("terminal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn canceled_is_only_framework_error() {
        assert!(TaskError::OperationCanceled.is_canceled());
        assert!(!TaskError::Timeout.is_canceled());
        assert!(!TaskError::Code(7).is_canceled());
    }

    #[test]
    fn other_errors_compare_by_identity() {
        let error = TaskError::other(anyhow::anyhow!("disk full"));
        let same = error.clone();
        let different = TaskError::other(anyhow::anyhow!("disk full"));

        assert_eq!(error, same);
        assert_ne!(error, different);
        assert_eq!(error.to_string(), "disk full");
    }
}
