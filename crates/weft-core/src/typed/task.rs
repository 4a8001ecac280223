//! TaskFunction trait - 登録される関数の形
//!
//! タスク本体は `async fn(TaskContext, TaskArgs) -> Result<Value, TaskError>`。
//! 引数は JSON のまま受け取り、`TaskArgs::arg` / `TaskArgs::kwarg` で
//! 必要な型に serde で decode する。

use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::context::TaskContext;
use crate::domain::TaskError;

/// Object-safe form of a task body, stored in the registry as
/// `Arc<dyn TaskFunction>`.
///
/// Plain async functions and closures with the right signature implement it
/// through the blanket impl below:
///
/// ```ignore
/// async fn add(_ctx: TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
///     let a: i64 = args.arg(0)?;
///     let b: i64 = args.arg(1)?;
///     Ok(Value::from(a + b))
/// }
///
/// registry.register("my_app.tasks.add", add)?;
/// ```
#[async_trait]
pub trait TaskFunction: Send + Sync + 'static {
    async fn call(&self, ctx: TaskContext, args: TaskArgs) -> Result<Value, TaskError>;
}

#[async_trait]
impl<F, Fut> TaskFunction for F
where
    F: Fn(TaskContext, TaskArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    async fn call(&self, ctx: TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
        (self)(ctx, args).await
    }
}

/// Positional and keyword arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
    #[error("missing positional argument {0}")]
    MissingPositional(usize),

    #[error("missing keyword argument '{0}'")]
    MissingKeyword(String),

    #[error("argument {name} could not be decoded: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<ArgumentError> for TaskError {
    fn from(err: ArgumentError) -> Self {
        TaskError::failed(err)
    }
}

impl TaskArgs {
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self { args, kwargs }
    }

    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArgumentError> {
        let value = self
            .args
            .get(index)
            .ok_or(ArgumentError::MissingPositional(index))?;
        decode(index.to_string(), value)
    }

    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgumentError> {
        let value = self
            .kwargs
            .get(name)
            .ok_or_else(|| ArgumentError::MissingKeyword(name.to_string()))?;
        decode(name.to_string(), value)
    }

    /// Like [`TaskArgs::kwarg`], but a missing keyword yields `default`.
    pub fn kwarg_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T, ArgumentError> {
        match self.kwargs.get(name) {
            Some(value) => decode(name.to_string(), value),
            None => Ok(default),
        }
    }
}

fn decode<T: DeserializeOwned>(name: String, value: &Value) -> Result<T, ArgumentError> {
    T::deserialize(value).map_err(|source| ArgumentError::Decode { name, source })
}
