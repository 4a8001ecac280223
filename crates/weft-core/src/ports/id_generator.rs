//! IdGenerator port - ID 生成の抽象化
//!
//! wire 上の `id` / `retryId` は不透明な文字列なので、ここでは ULID を
//! プレフィックス付きの文字列として払い出す。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use ulid::Ulid;

use crate::ports::{Clock, SystemClock};

/// IdGenerator は task id と retry chain id を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（Dispatcher が複数タスクから共有する）
pub trait IdGenerator: Send + Sync {
    /// 新しい投入ごとの task id
    fn generate_task_id(&self) -> String;

    /// retry chain の最初の retry で一度だけ払い出す id
    fn generate_retry_id(&self) -> String;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って timestamp 部分を決めるので、FixedClock を渡せば
/// timestamp 部分が固定された ID を生成できる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl Default for UlidGenerator<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> String {
        format!("task-{}", self.next_ulid())
    }

    fn generate_retry_id(&self) -> String {
        format!("retry-{}", self.next_ulid())
    }
}
