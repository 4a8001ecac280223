//! Dispatcher - タスクの投入・実行・リトライ
//!
//! # フロー
//! 1. `submit`: TaskRecord を作り、inline 実行するか QueueClient に送る
//! 2. `execute`: wire メッセージを TaskRecord に戻し、関数を呼ぶ
//! 3. 関数が `TaskError::Retry` を返したら後継の TaskRecord を作って再投入
//!
//! Dispatcher は安価に clone できるハンドル。TaskContext にも同じものを渡す。

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::domain::{CopyMode, RetryDirective, TaskError, TaskOutcome, TaskRecord, WorkerError};
use crate::ports::{IdGenerator, QueueClient, QueueError};
use crate::settings::Settings;
use crate::typed::{TaskArgs, TaskContext, TaskRegistry};

/// Parameters of one [`Dispatcher::submit`] call. Unset fields use the
/// dispatcher settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitRequest {
    pub function: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub queue: Option<String>,
    pub group_id: Option<String>,
    pub max_retries: Option<u32>,
    pub delay: Option<Duration>,
    pub execute_inline: bool,
}

impl SubmitRequest {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            ..Self::default()
        }
    }

    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn inline(mut self) -> Self {
        self.execute_inline = true;
        self
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<TaskRegistry>,
    client: Arc<dyn QueueClient>,
    ids: Arc<dyn IdGenerator>,
    settings: Arc<Settings>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TaskRegistry>,
        client: Arc<dyn QueueClient>,
        ids: Arc<dyn IdGenerator>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            registry,
            client,
            ids,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Create a new task and run it inline or send it to its queue.
    #[tracing::instrument(skip(self, request), fields(task = %request.function))]
    pub async fn submit(&self, request: SubmitRequest) -> Result<TaskOutcome, WorkerError> {
        let function = self.registry.resolve(&request.function)?;
        let task = TaskRecord {
            id: self.ids.generate_task_id(),
            group_id: request.group_id,
            // 呼び出し側 → 登録時のタスク既定値 → settings の順
            queue: request
                .queue
                .or_else(|| function.options().queue.clone())
                .unwrap_or_else(|| self.settings.default_queue.clone()),
            max_retries: request
                .max_retries
                .or(function.options().max_retries)
                .unwrap_or(self.settings.default_max_retries),
            function,
            args: request.args,
            kwargs: request.kwargs,
            retry: 0,
            retry_id: None,
        };
        let delay = request.delay.unwrap_or(self.settings.default_delay);
        let execute_inline = request.execute_inline || self.settings.execute_inline;

        self.enqueue(task, delay, execute_inline).await
    }

    /// Execute one wire message.
    pub async fn execute(&self, message: &str) -> Result<TaskOutcome, WorkerError> {
        let task = TaskRecord::deserialize(
            message,
            &self.registry,
            &self.settings.task_defaults(),
            self.ids.as_ref(),
        )?;

        self.execute_task(task).await
    }

    /// Schedule the successor of `task`.
    ///
    /// With `count_retries`, fails with [`WorkerError::MaxRetriesReached`] once
    /// `task.retry + 1` would exceed `task.max_retries`.
    pub async fn retry(
        &self,
        task: &TaskRecord,
        delay: Duration,
        execute_inline: bool,
        count_retries: bool,
    ) -> Result<TaskOutcome, WorkerError> {
        self.resubmit(task, task.max_retries, delay, execute_inline, count_retries)
            .await
    }

    fn execute_task(&self, task: TaskRecord) -> BoxFuture<'_, Result<TaskOutcome, WorkerError>> {
        async move {
            let function = task.function.clone();
            let ctx = TaskContext::new(task.clone(), self.clone());
            let args = TaskArgs::new(task.args.clone(), task.kwargs.clone());

            debug!(task = %function.name(), task_id = %task.id, retry = task.retry, "executing task");

            match function.function().call(ctx, args).await {
                Ok(value) => Ok(TaskOutcome::Completed(value)),
                Err(TaskError::Retry(directive)) => self.retry_with_directive(&task, directive).await,
                // 本体の ctx.retry が上限に達した場合だけそのまま返す
                Err(TaskError::Worker(err @ WorkerError::MaxRetriesReached { .. })) => Err(err),
                Err(TaskError::Worker(err)) => Err(WorkerError::ExecutionFailed {
                    task_name: function.name().to_string(),
                    source: Box::new(err),
                }),
                Err(TaskError::Failed(source)) => Err(WorkerError::ExecutionFailed {
                    task_name: function.name().to_string(),
                    source,
                }),
            }
        }
        .boxed()
    }

    async fn retry_with_directive(
        &self,
        task: &TaskRecord,
        directive: RetryDirective,
    ) -> Result<TaskOutcome, WorkerError> {
        let max_retries = directive
            .max_retries_fn
            .as_ref()
            .map_or(task.max_retries, |f| f(task));
        let count_retries = directive
            .count_retries
            .unwrap_or(self.settings.default_count_retries);
        let delay = directive.delay.unwrap_or(self.settings.default_delay);

        debug!(
            task = %task.function_name(),
            task_id = %task.id,
            cause = %directive.cause,
            "task requested a retry"
        );

        self.resubmit(
            task,
            max_retries,
            delay,
            self.settings.execute_inline,
            count_retries,
        )
        .await
    }

    async fn resubmit(
        &self,
        task: &TaskRecord,
        max_retries: u32,
        delay: Duration,
        execute_inline: bool,
        count_retries: bool,
    ) -> Result<TaskOutcome, WorkerError> {
        if count_retries && task.retry >= max_retries {
            warn!(
                task = %task.function_name(),
                task_id = %task.id,
                retry = task.retry,
                max_retries,
                "max retries reached"
            );
            return Err(WorkerError::MaxRetriesReached {
                retries: task.retry,
            });
        }

        let mode = if self.settings.force_serialization {
            CopyMode::ViaWire
        } else {
            CopyMode::Direct
        };
        let mut next = task.copy(
            mode,
            &self.registry,
            &self.settings.task_defaults(),
            self.ids.as_ref(),
        )?;
        next.max_retries = max_retries;
        if count_retries {
            next.retry = next
                .retry
                .checked_add(1)
                .ok_or(WorkerError::MaxRetriesReached { retries: task.retry })?;
        }
        if next.retry_id.is_none() {
            next.retry_id = Some(self.ids.generate_retry_id());
        }

        info!(
            task = %next.function_name(),
            task_id = %next.id,
            retry = next.retry,
            max_retries,
            delay_s = delay.as_secs(),
            "retrying task"
        );

        self.enqueue(next, delay, execute_inline).await
    }

    async fn enqueue(
        &self,
        task: TaskRecord,
        delay: Duration,
        execute_inline: bool,
    ) -> Result<TaskOutcome, WorkerError> {
        if execute_inline {
            return self.execute_task(task).await;
        }

        let message = task.serialize()?;
        let queue_name = format!("{}{}", self.settings.queue_prefix, task.queue);
        match self.client.send(&queue_name, &message, delay).await {
            Ok(()) => {
                debug!(task = %task.function_name(), task_id = %task.id, queue = %queue_name, "task enqueued");
                Ok(TaskOutcome::Enqueued {
                    task_id: task.id,
                    queue: task.queue,
                })
            }
            Err(QueueError::DoesNotExist(name)) => Err(WorkerError::InvalidQueue(name)),
            Err(err) => {
                warn!(queue = %queue_name, error = %err, "failed to enqueue task");
                Err(WorkerError::Queue(err))
            }
        }
    }
}
