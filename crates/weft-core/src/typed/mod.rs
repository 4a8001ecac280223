//! Typed - タスク関数の登録と呼び出し
//!
//! 名前（`module.path.symbol`）で関数を引く動的ディスパッチを、
//! 起動時に組み立てる明示的なレジストリで置き換える。
//!
//! # 構成
//! - **task**: `TaskFunction` trait（object-safe）と `TaskArgs`
//! - **context**: タスク本体に渡す `TaskContext`（retry 回数 + retry 機構）
//! - **registry**: 名前 → 関数の `TaskRegistry`

pub mod context;
pub mod registry;
pub mod task;

// 主要な trait/型 を再エクスポート
pub use self::context::{RetryOptions, TaskContext};
pub use self::registry::{RegisteredTask, RegistryError, TaskOptions, TaskRegistry};
pub use self::task::{ArgumentError, TaskArgs, TaskFunction};
