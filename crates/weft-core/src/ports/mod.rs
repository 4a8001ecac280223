//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（SQS などのキュー、時刻、ID 生成）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - 送信（QueueClient）と受信（QueueBackend）は別 trait
//! - コアはバックエンドのプロトコルを知らない

pub mod queue_client;
pub mod queue_backend;
pub mod clock;
pub mod id_generator;
pub mod event_sink;
pub mod execution_scope;

// 主要な trait を再エクスポート
pub use self::queue_client::{QueueClient, QueueError};
pub use self::queue_backend::{
    DeleteEntry, DeleteFailure, DeleteOutcome, QueueBackend, QueueHandle, RECEIVE_COUNT_ATTRIBUTE,
    ReceiveOptions, ReceivedMessage,
};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::event_sink::{BatchEvent, BatchListener};
pub use self::execution_scope::{ExecutionScope, NoopScope};
