//! weft-core
//!
//! Durable task dispatch over a managed message queue.
//!
//! # モジュール構成
//! - **domain**: TaskRecord と wire 形式、retry directive、エラー分類
//! - **ports**: 抽象化レイヤー（QueueClient, QueueBackend, Clock, IdGenerator, リスナー）
//! - **typed**: タスク関数の trait、引数の decode、TaskRegistry、TaskContext
//! - **impls**: 実装（InMemoryQueueBackend など開発用）
//! - **app**: Dispatcher、WorkerService、healthcheck、shutdown
//! - **settings**: 設定値と環境変数からの読み込み

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod settings;
pub mod typed;

pub use app::{AppBuilder, Dispatcher, Shutdown, SubmitRequest, WorkerService};
pub use domain::{RetryDirective, TaskError, TaskOutcome, TaskRecord, WorkerError};
pub use settings::Settings;
pub use typed::{RetryOptions, TaskArgs, TaskContext, TaskOptions, TaskRegistry};
