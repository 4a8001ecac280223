//! Test helpers: sample tasks, listeners and a wired dispatcher on the
//! in-memory backend.
//!
//! Run from workspace root: `cargo test -p weft-core`.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use weft_core::domain::BoxError;
use weft_core::impls::InMemoryQueueBackend;
use weft_core::ports::{BatchEvent, BatchListener, ExecutionScope, QueueHandle, ReceivedMessage};
use weft_core::{
    AppBuilder, Dispatcher, RetryDirective, Settings, Shutdown, TaskArgs, TaskContext, TaskError,
};

pub async fn add(_ctx: TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
    let a: i64 = args.arg(0)?;
    let b: i64 = args.arg(1)?;
    Ok(Value::from(a + b))
}

pub async fn explode(_ctx: TaskContext, _args: TaskArgs) -> Result<Value, TaskError> {
    Err(TaskError::failed("boom"))
}

pub async fn always_retry(_ctx: TaskContext, _args: TaskArgs) -> Result<Value, TaskError> {
    Err(TaskError::retry("try again"))
}

pub async fn retry_uncounted(_ctx: TaskContext, _args: TaskArgs) -> Result<Value, TaskError> {
    Err(RetryDirective::new("polling upstream")
        .with_count_retries(false)
        .into())
}

pub async fn retry_with_ceiling(_ctx: TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
    let ceiling: u32 = args.kwarg("ceiling")?;
    Err(RetryDirective::new("raise the ceiling")
        .with_max_retries_fn(move |_task| ceiling)
        .into())
}

pub async fn retry_later(_ctx: TaskContext, _args: TaskArgs) -> Result<Value, TaskError> {
    Err(RetryDirective::new("rate limited")
        .with_delay(std::time::Duration::from_secs(60))
        .into())
}

pub async fn panics(_ctx: TaskContext, _args: TaskArgs) -> Result<Value, TaskError> {
    panic!("task body panicked");
}

pub const TASKS: &[&str] = &[
    "tests.tasks.add",
    "tests.tasks.explode",
    "tests.tasks.always_retry",
    "tests.tasks.retry_uncounted",
    "tests.tasks.retry_with_ceiling",
    "tests.tasks.retry_later",
    "tests.tasks.panics",
];

/// Dispatcher plus the backend it sends to. Keeps the healthcheck directory alive.
pub struct TestApp {
    pub backend: Arc<InMemoryQueueBackend>,
    pub dispatcher: Dispatcher,
    pub _temp_dir: TempDir,
}

pub fn settings(temp_dir: &TempDir) -> Settings {
    Settings {
        healthcheck_file_name: temp_dir.path().join("healthcheck.txt"),
        ..Settings::default()
    }
}

pub fn setup_test_app(configure: impl FnOnce(&mut Settings)) -> TestApp {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut settings = settings(&temp_dir);
    configure(&mut settings);

    let backend = Arc::new(InMemoryQueueBackend::new());
    let dispatcher = AppBuilder::new(settings)
        .register(TASKS[0], add)
        .unwrap()
        .register(TASKS[1], explode)
        .unwrap()
        .register(TASKS[2], always_retry)
        .unwrap()
        .register(TASKS[3], retry_uncounted)
        .unwrap()
        .register(TASKS[4], retry_with_ceiling)
        .unwrap()
        .register(TASKS[5], retry_later)
        .unwrap()
        .register(TASKS[6], panics)
        .unwrap()
        .expect_tasks(TASKS)
        .build(backend.clone())
        .unwrap();

    TestApp {
        backend,
        dispatcher,
        _temp_dir: temp_dir,
    }
}

/// Wire message for `func` with the given retry bookkeeping.
pub fn message(func: &str, max_retries: u32, retry: u32) -> String {
    json!({
        "id": "task-test",
        "queue": "default",
        "func": func,
        "args": [],
        "kwargs": {},
        "maxRetries": max_retries,
        "retry": retry,
    })
    .to_string()
}

pub fn parse(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

/// One observed listener call.
#[derive(Debug, Clone)]
pub struct Observed {
    pub event: BatchEvent,
    pub queue: String,
    pub messages: usize,
    pub at: Instant,
}

/// Forwards every batch event to a channel.
pub struct RecordingListener {
    tx: mpsc::UnboundedSender<Observed>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl BatchListener for RecordingListener {
    async fn on_batch(
        &self,
        event: BatchEvent,
        queue: &QueueHandle,
        messages: &[ReceivedMessage],
    ) -> Result<(), BoxError> {
        let _ = self.tx.send(Observed {
            event,
            queue: queue.name.clone(),
            messages: messages.len(),
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Requests shutdown when `event` fires for a non-empty batch of `queue`,
/// the way a signal arriving mid-batch would.
pub struct StopOn {
    pub queue: String,
    pub event: BatchEvent,
    pub shutdown: Arc<Shutdown>,
}

#[async_trait]
impl BatchListener for StopOn {
    async fn on_batch(
        &self,
        event: BatchEvent,
        queue: &QueueHandle,
        messages: &[ReceivedMessage],
    ) -> Result<(), BoxError> {
        if event == self.event && queue.name == self.queue && !messages.is_empty() {
            self.shutdown.trigger();
        }
        Ok(())
    }
}

/// Always fails, sometimes loudly.
pub struct BrokenListener {
    pub panic: bool,
}

#[async_trait]
impl BatchListener for BrokenListener {
    async fn on_batch(
        &self,
        _event: BatchEvent,
        _queue: &QueueHandle,
        _messages: &[ReceivedMessage],
    ) -> Result<(), BoxError> {
        if self.panic {
            panic!("listener panicked");
        }
        Err("listener failed".into())
    }
}

/// Counts enter/exit pairs.
#[derive(Default)]
pub struct CountingScope {
    pub entered: AtomicUsize,
    pub exited: AtomicUsize,
    pub log: Mutex<Vec<&'static str>>,
}

impl CountingScope {
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn exited(&self) -> usize {
        self.exited.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionScope for CountingScope {
    async fn enter(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.log.lock().await.push("enter");
    }

    async fn exit(&self) {
        self.exited.fetch_add(1, Ordering::SeqCst);
        self.log.lock().await.push("exit");
    }
}
