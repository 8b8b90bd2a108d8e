//! HandlerRegistry - Handler の登録と管理
//!
//! 起動時に可変で組み立て、実行時は `Arc` で共有して読み取り専用で使います。
//! ロックは不要です。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::handler::{DynHandler, FnHandler, Handler, JobCall, TypedHandler};
use super::task::Task;
use crate::domain::{HandlerResult, TaskName};
use crate::error::RegistryError;

/// HandlerRegistry は task_name ごとの Handler を保持
///
/// # 使用例
/// ```ignore
/// let mut registry = HandlerRegistry::new();
/// registry.register::<AnalyzeDocument, _>(AnalyzeHandler)?;
///
/// let handler = registry.get("document_analysis");
/// ```
///
/// # 内部実装
/// - `register::<T: Task>(handler: impl Handler<T>)` で TypedHandler にラップ
/// - `register_dyn` / `register_fn` は型なしの handler を直接登録
/// - HashMap<TaskName, Arc<dyn DynHandler>> で管理
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskName, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_dyn(T::NAME, Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    pub fn register_fn<F, Fut>(&mut self, task_name: &str, f: F) -> Result<(), RegistryError>
    where
        F: Fn(JobCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_dyn(task_name, Arc::new(FnHandler::new(f)))
    }

    pub fn register_dyn(
        &mut self,
        task_name: &str,
        handler: Arc<dyn DynHandler>,
    ) -> Result<(), RegistryError> {
        let name = TaskName::parse(task_name)
            .ok_or_else(|| RegistryError::InvalidName(task_name.to_string()))?;
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, task_name: &str) -> Option<Arc<dyn DynHandler>> {
        let name = TaskName::parse(task_name)?;
        self.handlers.get(&name).cloned()
    }

    /// Resolve a submitted name to its registered key.
    pub fn resolve(&self, task_name: &str) -> Option<TaskName> {
        let name = TaskName::parse(task_name)?;
        self.handlers.contains_key(&name).then_some(name)
    }

    pub fn contains(&self, task_name: &str) -> bool {
        self.resolve(task_name).is_some()
    }

    /// Registered names, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().map(|n| n.to_string()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
