//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: タスク登録と Dispatcher の構築
//! - **Dispatcher**: 投入・実行・リトライ
//! - **WorkerService**: キューのポーリングループ
//! - **HealthcheckWriter / check_health**: liveness ファイル
//! - **Shutdown**: 停止要求（シグナル）の伝搬

pub mod builder;
pub mod dispatcher;
pub mod health;
pub mod service;
pub mod shutdown;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{AppBuilder, BuildError};
pub use self::dispatcher::{Dispatcher, SubmitRequest};
pub use self::health::{HealthError, HealthcheckWriter, check_health};
pub use self::service::{PREFIX_MARKER, WorkerService};
pub use self::shutdown::Shutdown;
pub use self::status::ServiceCounts;
