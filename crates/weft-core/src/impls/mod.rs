//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryQueueBackend**: 開発用のキュー（QueueClient + QueueBackend）
//!
//! # 本番用実装
//! SQS などの実装は別クレートに配置し、同じ ports を実装します。

pub mod inmem_queue;

pub use self::inmem_queue::InMemoryQueueBackend;
