//! Scheduler error types.

use thiserror::Error;

/// Failure to build and submit a task.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No task body was supplied before `run()`.
    #[error("no task body was supplied")]
    MissingBody,

    /// The runtime could not be classified into a known regime.
    #[error("server concurrency regime has not been detected")]
    UnsupportedEnvironment,

    /// The selected execution context rejected the submission. Propagated
    /// unchanged; no retry policy is applied here.
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Failure reported by an execution context at submission time.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The context has shut down and accepts no further work.
    #[error("execution context has shut down")]
    Shutdown,
}
