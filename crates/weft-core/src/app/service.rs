//! WorkerService - キューをポーリングしてタスクを実行するループ
//!
//! # フロー（1 イテレーション）
//! 1. 停止フラグを確認
//! 2. 必要ならキュー一覧を作り直す（静的キュー + prefix で見つかったキュー）
//! 3. キューごとに: 受信 → Received → 実行 → Processed → 一括削除 → Deleted
//! 4. healthcheck ファイルを更新（間隔制限つき）
//!
//! # 失敗の扱い
//! - メッセージ・リスナー・キュー単位で捕まえてログに落とす（ループは止めない）
//! - タスクが失敗してもメッセージは削除する（Dispatcher に渡せた時点で完了）
//! - 実行中のメッセージは中断しない。停止はチェックポイントでのみ

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::app::Dispatcher;
use crate::app::health::HealthcheckWriter;
use crate::app::status::ServiceCounts;
use crate::domain::WorkerError;
use crate::ports::{
    BatchEvent, BatchListener, Clock, DeleteEntry, ExecutionScope, NoopScope, QueueBackend,
    QueueError, QueueHandle, RECEIVE_COUNT_ATTRIBUTE, ReceiveOptions, ReceivedMessage,
    SystemClock,
};
use crate::settings::Settings;

/// Queue configuration entries starting with this are name prefixes.
pub const PREFIX_MARKER: &str = "prefix:";

#[derive(Debug, Clone)]
struct PolledQueue {
    handle: QueueHandle,
    is_static: bool,
}

/// Static names and prefixes split out of the queue configuration.
#[derive(Debug, Default, PartialEq, Eq)]
struct QueueSelection {
    names: Vec<String>,
    prefixes: Vec<String>,
}

impl QueueSelection {
    fn parse(entries: &[String]) -> Self {
        let mut selection = Self::default();
        for entry in entries {
            match entry.strip_prefix(PREFIX_MARKER) {
                Some(prefix) => push_unique(&mut selection.prefixes, prefix),
                None => push_unique(&mut selection.names, entry),
            }
        }
        selection
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

pub struct WorkerService {
    backend: Arc<dyn QueueBackend>,
    dispatcher: Dispatcher,
    listeners: Vec<Arc<dyn BatchListener>>,
    scope: Arc<dyn ExecutionScope>,
    clock: Arc<dyn Clock>,
    counts: ServiceCounts,
}

impl WorkerService {
    pub fn new(backend: Arc<dyn QueueBackend>, dispatcher: Dispatcher) -> Self {
        Self {
            backend,
            dispatcher,
            listeners: Vec::new(),
            scope: Arc::new(NoopScope),
            clock: Arc::new(SystemClock),
            counts: ServiceCounts::default(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn BatchListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_execution_scope(mut self, scope: Arc<dyn ExecutionScope>) -> Self {
        self.scope = scope;
        self
    }

    /// Clock used for the liveness file.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn counts(&self) -> &ServiceCounts {
        &self.counts
    }

    /// Poll `queue_names` until `shutdown` turns `true`.
    ///
    /// Entries of the form `prefix:<p>` select every queue whose name starts
    /// with `<p>`; the set is re-listed every `refresh_prefix_queues`.
    pub async fn process_queues(
        &mut self,
        queue_names: &[String],
        mut shutdown: watch::Receiver<bool>,
    ) {
        let settings = self.dispatcher.settings().clone();
        settings.log_summary();

        let mut health = HealthcheckWriter::new(
            settings.healthcheck_file_name.clone(),
            settings.min_healthcheck_write_period,
            self.clock.clone(),
        );
        if let Err(err) = health.write().await {
            warn!(path = %health.path().display(), error = %err, "failed to write healthcheck file");
        }

        let selection = QueueSelection::parse(queue_names);
        info!(queues = ?selection.names, prefixes = ?selection.prefixes, "starting polling service");

        let mut static_queues = Vec::new();
        let mut unresolved = Vec::new();
        for name in &selection.names {
            match self.backend.get_queue_by_name(name).await {
                Ok(handle) => static_queues.push(handle),
                Err(err) => {
                    self.counts.queue_errors += 1;
                    warn!(queue = %name, error = %err, "cannot resolve queue, will retry on refresh");
                    unresolved.push(name.clone());
                }
            }
        }

        let mut queues = polled(&static_queues, Vec::new());
        let mut last_refresh: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let needs_refresh = !selection.prefixes.is_empty() || !unresolved.is_empty();
            let refresh_due = last_refresh
                .is_none_or(|at| at.elapsed() >= settings.refresh_prefix_queues);
            if needs_refresh && refresh_due {
                unresolved = self.resolve_pending(unresolved, &mut static_queues).await;
                let discovered = self.discover(&selection.prefixes).await;
                // 一覧は丸ごと差し替える
                queues = polled(&static_queues, discovered);
                last_refresh = Some(Instant::now());
                debug!(
                    queues = ?queues.iter().map(|q| q.handle.name.as_str()).collect::<Vec<_>>(),
                    "refreshed queue list"
                );
            }

            if queues.is_empty() {
                debug!(wait_s = settings.no_queues_wait_time.as_secs(), "no queues to poll");
                tokio::select! {
                    _ = tokio::time::sleep(settings.no_queues_wait_time) => {}
                    Ok(()) = shutdown.changed() => {}
                }
                continue;
            }

            for queue in &queues {
                if *shutdown.borrow() {
                    break;
                }
                self.process_queue(queue, &settings).await;
                health.write_if_due().await;
            }
        }

        info!(counts = ?self.counts, "polling service stopped");
    }

    async fn resolve_pending(
        &mut self,
        pending: Vec<String>,
        static_queues: &mut Vec<QueueHandle>,
    ) -> Vec<String> {
        let mut still_missing = Vec::new();
        for name in pending {
            match self.backend.get_queue_by_name(&name).await {
                Ok(handle) => {
                    info!(queue = %name, "queue resolved");
                    static_queues.push(handle);
                }
                Err(err) => {
                    debug!(queue = %name, error = %err, "queue still unresolved");
                    still_missing.push(name);
                }
            }
        }
        still_missing
    }

    async fn discover(&mut self, prefixes: &[String]) -> Vec<QueueHandle> {
        let mut found = Vec::new();
        for prefix in prefixes {
            match self.backend.list_queues_by_prefix(prefix).await {
                Ok(handles) => found.extend(handles),
                Err(err) => {
                    self.counts.queue_errors += 1;
                    warn!(prefix = %prefix, error = %err, "failed to list queues by prefix");
                }
            }
        }
        found
    }

    async fn process_queue(&mut self, queue: &PolledQueue, settings: &Settings) {
        let options = ReceiveOptions {
            max_messages: settings.max_number_of_messages,
            wait_time: settings.wait_time,
            attribute_names: vec![RECEIVE_COUNT_ATTRIBUTE.to_string()],
        };
        let messages = match self.backend.receive_messages(&queue.handle, &options).await {
            Ok(messages) => messages,
            Err(err) => {
                self.report_queue_error(queue, &err);
                return;
            }
        };
        debug!(queue = %queue.handle.name, count = messages.len(), "polled messages");
        self.counts.received += messages.len();

        self.notify(BatchEvent::Received, &queue.handle, &messages)
            .await;

        let mut entries = Vec::with_capacity(messages.len());
        for message in &messages {
            self.execute_message(message).await;
            entries.push(DeleteEntry {
                id: message.message_id.clone(),
                receipt_handle: message.receipt_handle.clone(),
            });
        }

        self.notify(BatchEvent::Processed, &queue.handle, &messages)
            .await;

        if !entries.is_empty() {
            match self.backend.delete_messages(&queue.handle, &entries).await {
                Ok(outcome) => {
                    self.counts.deleted += outcome.successful.len();
                    if !outcome.failed.is_empty() {
                        self.counts.delete_failed += outcome.failed.len();
                        warn!(
                            queue = %queue.handle.name,
                            failed = outcome.failed.len(),
                            entries = ?outcome.failed,
                            "failed deleting messages"
                        );
                    }
                }
                Err(err) => {
                    self.report_queue_error(queue, &err);
                    return;
                }
            }
        }

        self.notify(BatchEvent::Deleted, &queue.handle, &messages)
            .await;
    }

    async fn execute_message(&mut self, message: &ReceivedMessage) {
        let span = info_span!("message", message_id = %message.message_id);

        debug!(message_id = %message.message_id, "read message");
        if let Some(count) = message.receive_count().filter(|c| *c > 1) {
            warn!(
                message_id = %message.message_id,
                receive_count = count,
                body = %message.body,
                "message was redelivered"
            );
        }

        let dispatcher = self.dispatcher.clone();
        let result = self
            .isolated(async move { dispatcher.execute(&message.body).await }.instrument(span))
            .await;

        match result {
            Ok(Ok(_)) => {
                self.counts.succeeded += 1;
                debug!(message_id = %message.message_id, "processed message");
            }
            Ok(Err(err)) => self.report_task_error(&message.message_id, &err),
            Err(panic) => {
                self.counts.failed += 1;
                self.counts.panicked += 1;
                error!(message_id = %message.message_id, panic = %panic, "task panicked");
            }
        }
    }

    async fn notify(&mut self, event: BatchEvent, queue: &QueueHandle, messages: &[ReceivedMessage]) {
        let listeners = self.listeners.clone();
        for listener in listeners {
            let result = self
                .isolated(listener.on_batch(event, queue, messages))
                .await;
            let failure = match result {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic,
            };
            self.counts.listener_failures += 1;
            error!(event = ?event, queue = %queue.name, error = %failure, "batch listener failed");
        }
    }

    /// Run `fut` inside the execution scope, turning a panic into `Err`.
    async fn isolated<F: Future>(&self, fut: F) -> Result<F::Output, String> {
        self.scope.enter().await;
        let result = AssertUnwindSafe(fut).catch_unwind().await;
        self.scope.exit().await;
        result.map_err(panic_message)
    }

    // タスク実行エラーのログはここだけで出す
    fn report_task_error(&mut self, message_id: &str, err: &WorkerError) {
        self.counts.failed += 1;
        match err {
            WorkerError::ExecutionFailed { .. } => {
                self.counts.execution_failed += 1;
                warn!(message_id = %message_id, error = %err, "handling message failed");
            }
            WorkerError::MaxRetriesReached { retries } => {
                self.counts.max_retries_reached += 1;
                error!(message_id = %message_id, retries, "giving up on message, max retries reached");
            }
            WorkerError::InvalidMessageFormat { .. } => {
                self.counts.invalid_message += 1;
                error!(message_id = %message_id, error = %err, "invalid task message");
            }
            _ => {
                self.counts.other_errors += 1;
                error!(message_id = %message_id, error = %err, "unhandled error while processing message");
            }
        }
    }

    fn report_queue_error(&mut self, queue: &PolledQueue, err: &QueueError) {
        self.counts.queue_errors += 1;
        if err.is_does_not_exist() && !queue.is_static {
            debug!(queue = %queue.handle.url, error = %err, "queue was already deleted");
        } else {
            warn!(queue = %queue.handle.url, error = %err, "error polling queue");
        }
    }
}

fn polled(static_queues: &[QueueHandle], discovered: Vec<QueueHandle>) -> Vec<PolledQueue> {
    let mut seen = HashSet::new();
    let statics = static_queues.iter().cloned().map(|handle| (handle, true));
    let dynamic = discovered.into_iter().map(|handle| (handle, false));
    statics
        .chain(dynamic)
        .filter(|(handle, _)| seen.insert(handle.name.clone()))
        .map(|(handle, is_static)| PolledQueue { handle, is_static })
        .collect()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn handle(name: &str) -> QueueHandle {
        QueueHandle {
            name: name.to_string(),
            url: format!("memory://queues/{name}"),
        }
    }

    #[test]
    fn selection_splits_prefixes_from_names() {
        let selection = QueueSelection::parse(&entries(&[
            "default",
            "prefix:jobs-",
            "default",
            "billing",
        ]));
        assert_eq!(selection.names, vec!["default", "billing"]);
        assert_eq!(selection.prefixes, vec!["jobs-"]);
    }

    #[test]
    fn polled_list_keeps_statics_first_and_dedups() {
        let queues = polled(
            &[handle("jobs-1"), handle("default")],
            vec![handle("jobs-1"), handle("jobs-2")],
        );
        let names: Vec<(&str, bool)> = queues
            .iter()
            .map(|q| (q.handle.name.as_str(), q.is_static))
            .collect();
        assert_eq!(
            names,
            vec![("jobs-1", true), ("default", true), ("jobs-2", false)]
        );
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }
}
