//! Retry directive: how a task body asks to be attempted again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::errors::{BoxError, WorkerError};
use super::task::TaskRecord;

/// Computes the effective retry ceiling from the task being retried.
pub type MaxRetriesFn = Arc<dyn Fn(&TaskRecord) -> u32 + Send + Sync>;

/// Returned (as [`TaskError::Retry`]) by a task body that wants another attempt.
///
/// Unset fields fall back to the dispatcher settings:
/// - `delay` -> `default_delay`
/// - `count_retries` -> `default_count_retries`
/// - `max_retries_fn` -> the task's own `max_retries`
pub struct RetryDirective {
    pub cause: BoxError,
    pub delay: Option<Duration>,
    pub count_retries: Option<bool>,
    pub max_retries_fn: Option<MaxRetriesFn>,
}

impl RetryDirective {
    pub fn new(cause: impl Into<BoxError>) -> Self {
        Self {
            cause: cause.into(),
            delay: None,
            count_retries: None,
            max_retries_fn: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_count_retries(mut self, count_retries: bool) -> Self {
        self.count_retries = Some(count_retries);
        self
    }

    pub fn with_max_retries_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskRecord) -> u32 + Send + Sync + 'static,
    {
        self.max_retries_fn = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for RetryDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryDirective")
            .field("cause", &self.cause)
            .field("delay", &self.delay)
            .field("count_retries", &self.count_retries)
            .field("max_retries_fn", &self.max_retries_fn.is_some())
            .finish()
    }
}

impl fmt::Display for RetryDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

/// What a task body returns on the error path.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Re-attempt the task later.
    #[error("retry requested: {0}")]
    Retry(RetryDirective),

    /// Terminal failure for this attempt.
    #[error(transparent)]
    Failed(BoxError),

    /// A dispatcher error raised while the body called back into the
    /// dispatcher. `MaxRetriesReached` from the body's own retry is passed
    /// through unchanged; anything else is reported as execution failed.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl TaskError {
    pub fn failed(err: impl Into<BoxError>) -> Self {
        TaskError::Failed(err.into())
    }

    pub fn retry(cause: impl Into<BoxError>) -> Self {
        TaskError::Retry(RetryDirective::new(cause))
    }
}

impl From<RetryDirective> for TaskError {
    fn from(directive: RetryDirective) -> Self {
        TaskError::Retry(directive)
    }
}
