//! QueueClient port - 送信側の抽象化
//!
//! Dispatcher はシリアライズ済みのタスクをここに渡すだけで、
//! バックエンド（SQS など）のプロトコルは知らない。

use std::time::Duration;

use async_trait::async_trait;

/// Errors surfaced by queue backends.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The named queue does not exist (or was deleted while in use).
    #[error("queue does not exist: {0}")]
    DoesNotExist(String),

    /// The requested delivery delay is outside the range the backend accepts.
    #[error("delay of {delay:?} exceeds the backend maximum of {max:?}")]
    InvalidDelay { delay: Duration, max: Duration },

    /// Any other backend failure.
    #[error("queue backend error: {0}")]
    Backend(String),
}

impl QueueError {
    pub fn is_does_not_exist(&self) -> bool {
        matches!(self, QueueError::DoesNotExist(_))
    }
}

/// Producer side of a queue backend.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Send one serialized task to `queue_name`, visible after `delay`.
    async fn send(&self, queue_name: &str, message: &str, delay: Duration)
    -> Result<(), QueueError>;
}
