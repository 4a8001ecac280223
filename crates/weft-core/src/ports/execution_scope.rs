//! ExecutionScope port - 実行ごとのリソース管理
//!
//! タスク実行（とリスナー呼び出し）の前後で `enter` / `exit` を呼ぶ。
//! `exit` は成功・エラー・panic のいずれでも必ず呼ばれる。
//! 例: キャッシュのリセット、プールされた接続の解放

use async_trait::async_trait;

#[async_trait]
pub trait ExecutionScope: Send + Sync {
    async fn enter(&self);
    async fn exit(&self);
}

/// Scope that holds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScope;

#[async_trait]
impl ExecutionScope for NoopScope {
    async fn enter(&self) {}

    async fn exit(&self) {}
}
