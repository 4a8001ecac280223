//! TaskRegistry - タスク関数の登録と名前解決
//!
//! 名前は `module.path.symbol` 形式。解決時は最後の `.` で module と symbol に
//! 分け、module → symbol の順に引く。
//!
//! # 設計
//! - 起動時に登録（mutable）、実行時は読み取りのみ（`Arc<TaskRegistry>`）
//! - 解決失敗は型付きエラー（RegistryError）で返す

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::task::TaskFunction;

/// Per-task defaults fixed at registration.
///
/// `submit` uses them when the request leaves queue / max_retries unset,
/// before falling back to the dispatcher settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    pub queue: Option<String>,
    pub max_retries: Option<u32>,
}

impl TaskOptions {
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// A resolved task function together with its registered name.
///
/// Two handles are equal when they point at the same registered function.
#[derive(Clone)]
pub struct RegisteredTask {
    name: Arc<str>,
    function: Arc<dyn TaskFunction>,
    options: Arc<TaskOptions>,
}

impl RegisteredTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> &Arc<dyn TaskFunction> {
        &self.function
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }
}

impl PartialEq for RegisteredTask {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.function), Arc::as_ptr(&other.function))
    }
}

impl fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegisteredTask").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("task '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("task name '{0}' is not of the form 'module.path.symbol'")]
    InvalidName(String),

    #[error("no module named '{0}'")]
    ModuleNotFound(String),

    #[error("module '{module}' has no task '{symbol}'")]
    SymbolNotFound { module: String, symbol: String },
}

#[derive(Default)]
pub struct TaskRegistry {
    modules: HashMap<String, HashMap<String, RegisteredTask>>,
}

fn split_name(name: &str) -> Result<(&str, &str), RegistryError> {
    match name.rsplit_once('.') {
        Some((module, symbol)) if !module.is_empty() && !symbol.is_empty() => Ok((module, symbol)),
        _ => Err(RegistryError::InvalidName(name.to_string())),
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    pub fn register<F: TaskFunction>(
        &mut self,
        name: impl Into<String>,
        function: F,
    ) -> Result<(), RegistryError> {
        self.register_with(name, function, TaskOptions::default())
    }

    /// Register with a task-specific default queue and / or retry ceiling.
    pub fn register_with<F: TaskFunction>(
        &mut self,
        name: impl Into<String>,
        function: F,
        options: TaskOptions,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let (module, symbol) = split_name(&name)?;

        let symbols = self.modules.entry(module.to_string()).or_default();
        if symbols.contains_key(symbol) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        let task = RegisteredTask {
            name: Arc::from(name.as_str()),
            function: Arc::new(function),
            options: Arc::new(options),
        };
        symbols.insert(symbol.to_string(), task);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<RegisteredTask, RegistryError> {
        let (module, symbol) = split_name(name)?;
        let symbols = self
            .modules
            .get(module)
            .ok_or_else(|| RegistryError::ModuleNotFound(module.to_string()))?;
        symbols
            .get(symbol)
            .cloned()
            .ok_or_else(|| RegistryError::SymbolNotFound {
                module: module.to_string(),
                symbol: symbol.to_string(),
            })
    }

    /// All registered names, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .values()
            .flat_map(|symbols| symbols.values().map(|task| task.name().to_string()))
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
