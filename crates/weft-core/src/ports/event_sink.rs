//! BatchListener port - バッチ処理のフック
//!
//! Polling service は 1 バッチごとに以下の 3 点でリスナーを呼ぶ：
//! - 受信直後（Received）
//! - 全メッセージの実行後（Processed）
//! - バッチ削除後（Deleted）
//!
//! リスナーの失敗（Err / panic）はループを止めない。

use async_trait::async_trait;

use super::{QueueHandle, ReceivedMessage};
use crate::domain::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchEvent {
    Received,
    Processed,
    Deleted,
}

#[async_trait]
pub trait BatchListener: Send + Sync {
    async fn on_batch(
        &self,
        event: BatchEvent,
        queue: &QueueHandle,
        messages: &[ReceivedMessage],
    ) -> Result<(), BoxError>;
}
