//! QueueBackend port - 受信側の抽象化
//!
//! Polling service が使う操作だけを定義する：
//! - 名前でキューを解決 / プレフィックスで一覧
//! - バッチ受信（long poll）
//! - バッチ削除（receipt handle 単位）

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::QueueError;

/// Attribute requested on every receive so redeliveries can be reported.
pub const RECEIVE_COUNT_ATTRIBUTE: &str = "ApproximateReceiveCount";

/// A resolved queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueHandle {
    pub name: String,
    pub url: String,
}

/// A message as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
}

impl ReceivedMessage {
    /// How many times the backend has handed this message out, if it told us.
    pub fn receive_count(&self) -> Option<u32> {
        self.attributes
            .get(RECEIVE_COUNT_ATTRIBUTE)
            .and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    pub max_messages: u32,
    pub wait_time: Duration,
    pub attribute_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntry {
    pub id: String,
    pub receipt_handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub id: String,
    pub code: String,
    pub message: String,
}

/// Per-entry result of a batch delete. A batch call can succeed as a whole
/// while individual entries fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

/// Consumer side of a queue backend.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn get_queue_by_name(&self, name: &str) -> Result<QueueHandle, QueueError>;

    async fn list_queues_by_prefix(&self, prefix: &str) -> Result<Vec<QueueHandle>, QueueError>;

    /// Receive up to `options.max_messages`, waiting at most `options.wait_time`
    /// when the queue is empty.
    async fn receive_messages(
        &self,
        queue: &QueueHandle,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    async fn delete_messages(
        &self,
        queue: &QueueHandle,
        entries: &[DeleteEntry],
    ) -> Result<DeleteOutcome, QueueError>;
}
