//! デモ用のタスクとリスナー

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use weft_core::domain::BoxError;
use weft_core::ports::{BatchEvent, BatchListener, QueueHandle, ReceivedMessage};
use weft_core::{RetryDirective, TaskArgs, TaskContext, TaskError};

pub const ADD: &str = "weft.demo.add";
pub const GREET: &str = "weft.demo.greet";
pub const FLAKY: &str = "weft.demo.flaky";

pub async fn add(_ctx: TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
    let a: i64 = args.arg(0)?;
    let b: i64 = args.arg(1)?;
    info!(a, b, sum = a + b, "add");
    Ok(Value::from(a + b))
}

#[derive(Debug, Deserialize)]
struct Greeting {
    name: String,
    #[serde(default)]
    excited: bool,
}

pub async fn greet(_ctx: TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
    let greeting: Greeting = args.kwarg("greeting")?;
    let mark = if greeting.excited { "!" } else { "." };
    let text = format!("Hello, {}{mark}", greeting.name);
    info!(%text, "greet");
    Ok(Value::from(text))
}

/// Fails its first two attempts, asking for a retry a second later.
pub async fn flaky(ctx: TaskContext, _args: TaskArgs) -> Result<Value, TaskError> {
    if ctx.retry_num() < 2 {
        return Err(RetryDirective::new(format!("attempt {} failed", ctx.retry_num()))
            .with_delay(Duration::from_secs(1))
            .into());
    }
    info!(retry = ctx.retry_num(), "flaky task finally succeeded");
    Ok(Value::Null)
}

/// Logs every non-empty batch.
pub struct LoggingListener;

#[async_trait]
impl BatchListener for LoggingListener {
    async fn on_batch(
        &self,
        event: BatchEvent,
        queue: &QueueHandle,
        messages: &[ReceivedMessage],
    ) -> Result<(), BoxError> {
        if !messages.is_empty() {
            info!(event = ?event, queue = %queue.name, count = messages.len(), "batch");
        }
        Ok(())
    }
}
