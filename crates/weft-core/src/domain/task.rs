//! Task record: the serializable unit of work and its wire format.
//!
//! Wire format (JSON object, field names fixed):
//!
//! ```text
//! {"id": "...", "groupId": null, "queue": "default", "func": "app.tasks.add",
//!  "args": [2, 3], "kwargs": {}, "maxRetries": 5, "retry": 0, "retryId": null}
//! ```
//!
//! `func`, `args` and `kwargs` are mandatory on read; the other fields have
//! defaults. Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::WorkerError;
use crate::ports::IdGenerator;
use crate::settings::TaskDefaults;
use crate::typed::{RegisteredTask, TaskRegistry};

/// One scheduled or executing invocation.
///
/// A retry never mutates a record in place: the dispatcher builds a successor
/// with [`TaskRecord::copy`] and changes the copy.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    pub group_id: Option<String>,
    pub queue: String,
    pub function: RegisteredTask,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub max_retries: u32,
    pub retry: u32,
    pub retry_id: Option<String>,
}

/// How [`TaskRecord::copy`] builds the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Field-by-field clone.
    Direct,
    /// Serialize, then deserialize: validates exactly what would be sent.
    ViaWire,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTaskRef<'a> {
    id: &'a str,
    group_id: Option<&'a str>,
    queue: &'a str,
    func: &'a str,
    args: &'a [Value],
    kwargs: &'a Map<String, Value>,
    max_retries: u32,
    retry: u32,
    retry_id: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTask {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    queue: Option<String>,
    func: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    retry: Option<u32>,
    #[serde(default)]
    retry_id: Option<String>,
}

impl TaskRecord {
    /// Fully-qualified name of the task function.
    pub fn function_name(&self) -> &str {
        self.function.name()
    }

    pub fn serialize(&self) -> Result<String, WorkerError> {
        let wire = WireTaskRef {
            id: &self.id,
            group_id: self.group_id.as_deref(),
            queue: &self.queue,
            func: self.function.name(),
            args: &self.args,
            kwargs: &self.kwargs,
            max_retries: self.max_retries,
            retry: self.retry,
            retry_id: self.retry_id.as_deref(),
        };
        serde_json::to_string(&wire).map_err(|e| WorkerError::invalid_message(&self.id, e))
    }

    /// Parse a wire message and resolve its function through `registry`.
    /// A missing `id` is minted by `ids`.
    ///
    /// Any failure (bad JSON, missing mandatory field, unknown function) is
    /// reported as [`WorkerError::InvalidMessageFormat`].
    pub fn deserialize(
        message: &str,
        registry: &TaskRegistry,
        defaults: &TaskDefaults,
        ids: &dyn IdGenerator,
    ) -> Result<Self, WorkerError> {
        let wire: WireTask =
            serde_json::from_str(message).map_err(|e| WorkerError::invalid_message(message, e))?;

        let function = registry
            .resolve(&wire.func)
            .map_err(|e| WorkerError::invalid_message(message, e))?;

        Ok(Self {
            id: wire.id.unwrap_or_else(|| ids.generate_task_id()),
            group_id: wire.group_id,
            queue: wire.queue.unwrap_or_else(|| defaults.queue.clone()),
            function,
            args: wire.args,
            kwargs: wire.kwargs,
            max_retries: wire.max_retries.unwrap_or(defaults.max_retries),
            retry: wire.retry.unwrap_or(0),
            retry_id: wire.retry_id,
        })
    }

    pub fn copy(
        &self,
        mode: CopyMode,
        registry: &TaskRegistry,
        defaults: &TaskDefaults,
        ids: &dyn IdGenerator,
    ) -> Result<Self, WorkerError> {
        match mode {
            CopyMode::Direct => Ok(self.clone()),
            CopyMode::ViaWire => Self::deserialize(&self.serialize()?, registry, defaults, ids),
        }
    }
}
