use thiserror::Error;

/// Error type for everything the clustering engines and the task framework
/// can fail with.
///
/// Configuration and state errors are raised synchronously from the call that
/// caused them. Numeric, storage and body-signalled failures are captured by
/// the running task and surface through [`Task::get`](crate::Task::get) as the
/// `Error` outcome. [`ClusterError::Cancelled`] is the terminal outcome of a
/// cooperative cancel, not a fault.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClusterError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("numeric error: {0}")]
    Numeric(String),

    #[error("task was cancelled")]
    Cancelled,

    /// Another thread already owns the task's single execution slot.
    #[error("task is already being executed by another thread")]
    RejectedExecution,

    #[error("timed out waiting for the task to finish")]
    Timeout,

    /// Failure signalled deliberately by a task body. Carries no panic
    /// backtrace, unlike [`ClusterError::Panic`].
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// A panic escaped the task body and was captured at the run boundary.
    #[error("task panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures raised by a [`TupleStoreFactory`](crate::TupleStoreFactory).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("a tuple store named '{0}' already exists")]
    NameCollision(String),

    #[error("no tuple store named '{0}'")]
    NotFound(String),

    #[error("tuple store '{0}' is closed")]
    Closed(String),

    #[error("tuple store I/O failure: {0}")]
    Io(String),
}
