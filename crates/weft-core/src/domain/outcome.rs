//! Outcome of handing a task to the dispatcher.

use serde_json::Value;

/// What `submit` / `execute` / `retry` produced.
///
/// - `Completed`: the task body ran in-process and returned a value.
/// - `Enqueued`: the (successor) task was sent to a queue; its result is not
///   observable by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(Value),
    Enqueued { task_id: String, queue: String },
}

impl TaskOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            TaskOutcome::Enqueued { .. } => None,
        }
    }

    pub fn is_enqueued(&self) -> bool {
        matches!(self, TaskOutcome::Enqueued { .. })
    }
}
