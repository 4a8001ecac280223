//! Errors - 失敗の分類
//!
//! Dispatcher が表に出す失敗は次の通り。どれも握りつぶさず、呼び出し側で
//! 区別できる variant として返す。
//! - InvalidMessageFormat: wire データが壊れている / 関数が解決できない
//! - ExecutionFailed: タスク本体が retry 以外のエラーを返した
//! - MaxRetriesReached: retry の予算切れ
//! - InvalidQueue / Queue: バックエンド側の失敗

use crate::ports::QueueError;
use crate::typed::RegistryError;

/// Boxed error used wherever the concrete source type is open-ended
/// (task bodies, listeners).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("invalid message format: {source} (message: {message})")]
    InvalidMessageFormat {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("task {task_name} failed: {source}")]
    ExecutionFailed {
        task_name: String,
        #[source]
        source: BoxError,
    },

    #[error("max retries reached after {retries} retries")]
    MaxRetriesReached { retries: u32 },

    #[error("queue {0} does not exist")]
    InvalidQueue(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl WorkerError {
    pub(crate) fn invalid_message(message: &str, source: impl Into<BoxError>) -> Self {
        WorkerError::InvalidMessageFormat {
            message: message.to_string(),
            source: source.into(),
        }
    }

    pub fn is_execution_failed(&self) -> bool {
        matches!(self, WorkerError::ExecutionFailed { .. })
    }
}
