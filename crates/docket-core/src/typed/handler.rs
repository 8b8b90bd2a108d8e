//! Handler trait - Task を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)
//! - クロージャ adapter (FnHandler)

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::task::Task;
use crate::domain::{HandlerResult, JobId, JobRecord};

/// Handler に渡される 1 回分の呼び出し内容
///
/// JobRecord から必要な分だけ owned でコピーしたもの。
/// handler は専用の tokio task で動くので参照は持ちません。
#[derive(Debug, Clone, PartialEq)]
pub struct JobCall {
    pub job_id: JobId,
    pub task_name: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub metadata: Map<String, Value>,
    /// Retries already consumed before this attempt.
    pub retry_count: u32,
}

impl JobCall {
    pub fn from_record(job: &JobRecord) -> Self {
        Self {
            job_id: job.job_id,
            task_name: job.task_name.to_string(),
            args: job.args.clone(),
            kwargs: job.kwargs.clone(),
            metadata: job.metadata.clone(),
            retry_count: job.retry_count,
        }
    }
}

/// Handler は Task を実行して JSON 値かエラーを返す
///
/// # 使用例
/// ```ignore
/// struct AnalyzeHandler;
///
/// #[async_trait]
/// impl Handler<AnalyzeDocument> for AnalyzeHandler {
///     async fn handle(&self, task: AnalyzeDocument, _call: &JobCall) -> HandlerResult {
///         Ok(json!({ "document_id": task.document_id }))
///     }
/// }
/// ```
///
/// # ジェネリクスによる型安全性
/// - `Handler<AnalyzeDocument>` は `AnalyzeDocument` しか受け取れない
/// - コンパイル時に Task と Handler の対応が保証される
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T, call: &JobCall) -> HandlerResult;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// HashMap<TaskName, Arc<dyn DynHandler>> に格納するための型消去層です。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, call: JobCall) -> HandlerResult;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, call: JobCall) -> HandlerResult {
        let task = T::decode(&call)?;
        self.handler.handle(task, &call).await
    }
}

/// Untyped closure handler: receives the raw call.
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(JobCall) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> DynHandler for FnHandler<F>
where
    F: Fn(JobCall) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle_dyn(&self, call: JobCall) -> HandlerResult {
        (self.f)(call).await
    }
}
