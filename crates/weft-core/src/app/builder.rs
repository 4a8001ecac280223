//! AppBuilder - Dispatcher の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - グローバル状態の代わりに、構築した Dispatcher を明示的に渡す

use std::sync::Arc;

use crate::app::Dispatcher;
use crate::ports::{IdGenerator, QueueClient, UlidGenerator};
use crate::settings::Settings;
use crate::typed::{RegistryError, TaskFunction, TaskOptions, TaskRegistry};

/// AppBuilder はタスクを登録して Dispatcher を構築する
///
/// # 使用例
/// ```ignore
/// let dispatcher = AppBuilder::new(Settings::from_env()?)
///     .register("my_app.tasks.add", add)?
///     .expect_tasks(&["my_app.tasks.add"])
///     .build(queue_client)?;
/// ```
///
/// # Fail-fast 設計
/// - expect_tasks() で期待されるタスク名を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct AppBuilder {
    settings: Settings,
    registry: TaskRegistry,
    expected_tasks: Option<Vec<String>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing tasks: {0:?}. These tasks were expected but not registered.")]
    MissingTasks(Vec<String>),
}

impl AppBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            registry: TaskRegistry::new(),
            expected_tasks: None,
            ids: None,
        }
    }

    /// タスク関数を `module.path.symbol` 形式の名前で登録
    pub fn register<F: TaskFunction>(
        mut self,
        name: impl Into<String>,
        function: F,
    ) -> Result<Self, RegistryError> {
        self.registry.register(name, function)?;
        Ok(self)
    }

    /// 既定のキューと max_retries をタスクごとに指定して登録
    pub fn register_with<F: TaskFunction>(
        mut self,
        name: impl Into<String>,
        function: F,
        options: TaskOptions,
    ) -> Result<Self, RegistryError> {
        self.registry.register_with(name, function, options)?;
        Ok(self)
    }

    pub fn expect_tasks(mut self, names: &[&str]) -> Self {
        self.expected_tasks = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    /// Replace the default ULID generator (tests use a fixed clock).
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self, client: Arc<dyn QueueClient>) -> Result<Dispatcher, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let registered = self.registry.registered_names();
            let missing: Vec<String> = expected_tasks
                .iter()
                .filter(|name| !registered.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTasks(missing));
            }
        }

        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::default()));
        Ok(Dispatcher::new(
            Arc::new(self.registry),
            client,
            ids,
            Arc::new(self.settings),
        ))
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskError;
    use crate::impls::InMemoryQueueBackend;
    use crate::typed::{TaskArgs, TaskContext};
    use serde_json::Value;

    async fn noop(_ctx: TaskContext, _args: TaskArgs) -> Result<Value, TaskError> {
        Ok(Value::Null)
    }

    fn client() -> Arc<dyn QueueClient> {
        Arc::new(InMemoryQueueBackend::new())
    }

    #[test]
    fn test_build_success() {
        let dispatcher = AppBuilder::default()
            .register("app.tasks.noop", noop)
            .unwrap()
            .expect_tasks(&["app.tasks.noop"])
            .build(client());
        assert!(dispatcher.is_ok());
    }

    #[test]
    fn test_build_missing_tasks() {
        let dispatcher = AppBuilder::default()
            .register("app.tasks.noop", noop)
            .unwrap()
            .expect_tasks(&["app.tasks.noop", "app.tasks.other"])
            .build(client());
        assert!(matches!(
            dispatcher,
            Err(BuildError::MissingTasks(missing)) if missing == vec!["app.tasks.other".to_string()]
        ));
    }

    #[test]
    fn test_register_with_keeps_task_options() {
        let dispatcher = AppBuilder::default()
            .register_with(
                "app.tasks.noop",
                noop,
                TaskOptions::default().queue("slow").max_retries(2),
            )
            .unwrap()
            .expect_tasks(&["app.tasks.noop"])
            .build(client())
            .unwrap();

        let task = dispatcher.registry().resolve("app.tasks.noop").unwrap();
        assert_eq!(task.options().queue.as_deref(), Some("slow"));
        assert_eq!(task.options().max_retries, Some(2));
    }

    #[test]
    fn test_build_no_expect_tasks() {
        let dispatcher = AppBuilder::default()
            .register("app.tasks.noop", noop)
            .unwrap()
            .build(client())
            .unwrap();
        assert_eq!(dispatcher.registry().len(), 1);
        assert_eq!(dispatcher.settings(), &Settings::default());
    }
}
