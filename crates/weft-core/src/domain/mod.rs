//! Domain model (task record, retry directive, outcomes, errors).
//!
//! - task: TaskRecord と wire format
//! - retry: RetryDirective / TaskError（タスク本体が返すもの）
//! - outcome: TaskOutcome
//! - errors: WorkerError（Dispatcher が返すもの）

pub mod errors;
pub mod outcome;
pub mod retry;
pub mod task;

pub use self::errors::{BoxError, WorkerError};
pub use self::outcome::TaskOutcome;
pub use self::retry::{MaxRetriesFn, RetryDirective, TaskError};
pub use self::task::{CopyMode, TaskRecord};
