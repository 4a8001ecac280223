//! InMemoryQueueBackend - 開発・テスト用のキュー
//!
//! SQS の振る舞いのうち、このクレートが依存する部分だけを再現する：
//! - 遅延配送（delay）と最大遅延のチェック
//! - 受信後の visibility timeout（削除されなければ再配送）
//! - receive count の属性
//! - long poll（send で待機中の receive を起こす）
//!
//! # 実装詳細
//! - `tokio::sync::Mutex` で全キューを保護（ロックを跨いで待たない）
//! - `Notify::notify_waiters` で send を通知
//! - 時刻は `tokio::time::Instant`（テストで時間を止められる）

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use ulid::Ulid;

use crate::ports::{
    DeleteEntry, DeleteFailure, DeleteOutcome, QueueBackend, QueueClient, QueueError, QueueHandle,
    RECEIVE_COUNT_ATTRIBUTE, ReceiveOptions, ReceivedMessage,
};

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(900);

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    visible_at: Instant,
    receive_count: u32,
    receipt_handle: Option<String>,
}

/// In-process queue backend implementing both [`QueueClient`] and
/// [`QueueBackend`].
///
/// # 使用例
/// ```ignore
/// let backend = Arc::new(InMemoryQueueBackend::new());
/// backend.create_queue("default").await;
/// let dispatcher = AppBuilder::new(settings).build(backend.clone())?;
/// let service = WorkerService::new(backend, dispatcher);
/// ```
#[derive(Debug)]
pub struct InMemoryQueueBackend {
    queues: Mutex<HashMap<String, Vec<StoredMessage>>>,
    notify: Notify,
    auto_create: bool,
    visibility_timeout: Duration,
    max_delay: Duration,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            auto_create: false,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Create queues on first send instead of failing with `DoesNotExist`.
    pub fn with_auto_create(mut self) -> Self {
        self.auto_create = true;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub async fn create_queue(&self, name: &str) -> QueueHandle {
        self.queues.lock().await.entry(name.to_string()).or_default();
        handle_for(name)
    }

    /// Returns `false` when the queue did not exist.
    pub async fn delete_queue(&self, name: &str) -> bool {
        self.queues.lock().await.remove(name).is_some()
    }

    pub async fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Messages currently stored in `name`, visible or not.
    pub async fn message_count(&self, name: &str) -> usize {
        self.queues.lock().await.get(name).map_or(0, Vec::len)
    }

    /// Remove and return every body stored in `name`, in send order.
    pub async fn take_messages(&self, name: &str) -> Vec<String> {
        self.queues
            .lock()
            .await
            .get_mut(name)
            .map(|messages| messages.drain(..).map(|m| m.body).collect())
            .unwrap_or_default()
    }

    async fn try_receive(
        &self,
        queue: &QueueHandle,
        max_messages: usize,
    ) -> Result<(Vec<ReceivedMessage>, Option<Instant>), QueueError> {
        let mut queues = self.queues.lock().await;
        let messages = queues
            .get_mut(&queue.name)
            .ok_or_else(|| QueueError::DoesNotExist(queue.name.clone()))?;

        let now = Instant::now();
        let mut received = Vec::new();
        for message in messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if message.visible_at > now {
                continue;
            }
            let receipt_handle = Ulid::new().to_string();
            message.receive_count += 1;
            message.visible_at = now + self.visibility_timeout;
            message.receipt_handle = Some(receipt_handle.clone());

            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle,
                body: message.body.clone(),
                attributes: HashMap::from([(
                    RECEIVE_COUNT_ATTRIBUTE.to_string(),
                    message.receive_count.to_string(),
                )]),
            });
        }

        let next_visible = messages
            .iter()
            .map(|m| m.visible_at)
            .filter(|at| *at > now)
            .min();
        Ok((received, next_visible))
    }
}

impl Default for InMemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn handle_for(name: &str) -> QueueHandle {
    QueueHandle {
        name: name.to_string(),
        url: format!("memory://queues/{name}"),
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueBackend {
    async fn send(
        &self,
        queue_name: &str,
        message: &str,
        delay: Duration,
    ) -> Result<(), QueueError> {
        if delay > self.max_delay {
            return Err(QueueError::InvalidDelay {
                delay,
                max: self.max_delay,
            });
        }

        {
            let mut queues = self.queues.lock().await;
            if !self.auto_create && !queues.contains_key(queue_name) {
                return Err(QueueError::DoesNotExist(queue_name.to_string()));
            }
            queues.entry(queue_name.to_string()).or_default().push(StoredMessage {
                message_id: Ulid::new().to_string(),
                body: message.to_string(),
                visible_at: Instant::now() + delay,
                receive_count: 0,
                receipt_handle: None,
            });
        }

        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn get_queue_by_name(&self, name: &str) -> Result<QueueHandle, QueueError> {
        if self.queues.lock().await.contains_key(name) {
            Ok(handle_for(name))
        } else {
            Err(QueueError::DoesNotExist(name.to_string()))
        }
    }

    async fn list_queues_by_prefix(&self, prefix: &str) -> Result<Vec<QueueHandle>, QueueError> {
        let queues = self.queues.lock().await;
        let mut names: Vec<&String> = queues.keys().filter(|n| n.starts_with(prefix)).collect();
        names.sort();
        Ok(names.into_iter().map(|n| handle_for(n)).collect())
    }

    async fn receive_messages(
        &self,
        queue: &QueueHandle,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + options.wait_time;
        let max_messages = options.max_messages.max(1) as usize;

        loop {
            // 先に登録しておかないと、チェックと待機の間の send を取りこぼす
            let notified = self.notify.notified();

            let (received, next_visible) = self.try_receive(queue, max_messages).await?;
            if !received.is_empty() || Instant::now() >= deadline {
                return Ok(received);
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete_messages(
        &self,
        queue: &QueueHandle,
        entries: &[DeleteEntry],
    ) -> Result<DeleteOutcome, QueueError> {
        let mut queues = self.queues.lock().await;
        let messages = queues
            .get_mut(&queue.name)
            .ok_or_else(|| QueueError::DoesNotExist(queue.name.clone()))?;

        let mut outcome = DeleteOutcome::default();
        for entry in entries {
            let position = messages
                .iter()
                .position(|m| m.receipt_handle.as_deref() == Some(entry.receipt_handle.as_str()));
            match position {
                Some(index) => {
                    messages.remove(index);
                    outcome.successful.push(entry.id.clone());
                }
                None => outcome.failed.push(DeleteFailure {
                    id: entry.id.clone(),
                    code: "ReceiptHandleIsInvalid".to_string(),
                    message: format!("unknown receipt handle {}", entry.receipt_handle),
                }),
            }
        }
        Ok(outcome)
    }
}
