//! weft CLI - デモ worker と healthcheck
//!
//! Settings are read from `WEFT_*` environment variables; log filtering from
//! `RUST_LOG` (default `info`).

mod tasks;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use weft_core::app::{PREFIX_MARKER, check_health};
use weft_core::impls::InMemoryQueueBackend;
use weft_core::ports::SystemClock;
use weft_core::{AppBuilder, Settings, Shutdown, SubmitRequest, WorkerService};

#[derive(Parser)]
#[command(name = "weft", about = "Task dispatch worker")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true, env = "WEFT_LOG_JSON")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll queues on the in-memory backend until SIGTERM / Ctrl+C
    Run {
        /// Queue name, or `prefix:<p>` for every queue starting with `<p>`
        #[arg(long = "queue", default_value = "default")]
        queues: Vec<String>,
        /// Number of demo tasks to enqueue at startup
        #[arg(long, default_value = "3")]
        demo: usize,
    },
    /// Exit non-zero when the liveness file is missing or stale
    Healthcheck {
        /// Defaults to WEFT_HEALTHCHECK_FILE_NAME
        #[arg(long)]
        file: Option<PathBuf>,
        /// Seconds; defaults to WEFT_HEALTHCHECK_UNHEALTHY_PERIOD_S
        #[arg(long)]
        max_age: Option<u64>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if json {
        builder.json().with_target(false).try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let settings = Settings::from_env().context("invalid WEFT_* settings")?;

    match cli.command {
        Commands::Run { queues, demo } => run(settings, queues, demo).await,
        Commands::Healthcheck { file, max_age } => {
            let path = file.unwrap_or_else(|| settings.healthcheck_file_name.clone());
            let max_age = max_age
                .map(Duration::from_secs)
                .unwrap_or(settings.healthcheck_unhealthy_period);
            match check_health(&path, max_age, &SystemClock).await {
                Ok(last) => {
                    println!("healthy: last heartbeat at {}", last.to_rfc3339());
                    Ok(())
                }
                Err(err) => {
                    eprintln!("unhealthy: {err}");
                    std::process::exit(1);
                }
            }
        }
    }
}

async fn run(settings: Settings, queues: Vec<String>, demo: usize) -> anyhow::Result<()> {
    // 静的なキュー名には送信側と同じ prefix を付けて作っておく
    let queues: Vec<String> = queues
        .into_iter()
        .map(|q| {
            if q.starts_with(PREFIX_MARKER) {
                q
            } else {
                format!("{}{q}", settings.queue_prefix)
            }
        })
        .collect();
    let backend = Arc::new(InMemoryQueueBackend::new().with_auto_create());
    for name in queues.iter().filter(|q| !q.starts_with(PREFIX_MARKER)) {
        backend.create_queue(name).await;
    }

    let dispatcher = AppBuilder::new(settings)
        .register(tasks::ADD, tasks::add)?
        .register(tasks::GREET, tasks::greet)?
        .register(tasks::FLAKY, tasks::flaky)?
        .expect_tasks(&[tasks::ADD, tasks::GREET, tasks::FLAKY])
        .build(backend.clone())?;

    let queue = dispatcher.settings().default_queue.clone();
    for i in 0..demo {
        let request = match i % 3 {
            0 => SubmitRequest::new(tasks::ADD).args(vec![json!(i), json!(i * 10)]),
            1 => SubmitRequest::new(tasks::GREET)
                .kwarg("greeting", json!({"name": format!("worker {i}"), "excited": true})),
            _ => SubmitRequest::new(tasks::FLAKY).max_retries(5),
        };
        dispatcher
            .submit(request.queue(queue.clone()))
            .await
            .context("failed to enqueue demo task")?;
    }
    info!(count = demo, queue = %queue, "demo tasks enqueued");

    let shutdown = Shutdown::new();
    let signals = shutdown.listen_for_signals();

    let mut service = WorkerService::new(backend, dispatcher)
        .with_listener(Arc::new(tasks::LoggingListener));
    service.process_queues(&queues, shutdown.subscribe()).await;

    signals.abort();
    info!("worker stopped");
    // 集計は stdout に 1 行の JSON で
    println!(
        "{}",
        serde_json::to_string(service.counts()).context("failed to encode counts")?
    );
    Ok(())
}
