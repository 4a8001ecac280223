//! TaskContext - 実行中のタスク本体に渡されるコンテキスト
//!
//! 現在の retry 回数と、Dispatcher の retry 機構へのハンドルを持つ。
//! 関数オブジェクトに状態を生やす代わりに、明示的な引数として渡す。

use std::time::Duration;

use crate::app::Dispatcher;
use crate::domain::{TaskOutcome, TaskRecord, WorkerError};

/// Overrides for [`TaskContext::retry`]. Unset fields use the dispatcher
/// settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryOptions {
    pub delay: Option<Duration>,
    pub execute_inline: Option<bool>,
    pub count_retries: Option<bool>,
}

#[derive(Clone)]
pub struct TaskContext {
    task: TaskRecord,
    dispatcher: Dispatcher,
}

impl TaskContext {
    pub(crate) fn new(task: TaskRecord, dispatcher: Dispatcher) -> Self {
        Self { task, dispatcher }
    }

    /// Current attempt count (`0` on the first attempt).
    pub fn retry_num(&self) -> u32 {
        self.task.retry
    }

    pub fn task(&self) -> &TaskRecord {
        &self.task
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Schedule another attempt of the running task.
    ///
    /// Equivalent to returning [`TaskError::Retry`](crate::domain::TaskError::Retry),
    /// but the caller gets the outcome back and decides what to return.
    pub async fn retry(&self, options: RetryOptions) -> Result<TaskOutcome, WorkerError> {
        let settings = self.dispatcher.settings();
        let delay = options.delay.unwrap_or(settings.default_delay);
        let execute_inline = options.execute_inline.unwrap_or(false) || settings.execute_inline;
        let count_retries = options
            .count_retries
            .unwrap_or(settings.default_count_retries);

        self.dispatcher
            .retry(&self.task, delay, execute_inline, count_retries)
            .await
    }
}
