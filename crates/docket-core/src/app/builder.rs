//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 差し替え可能な ports（Clock, HttpTransport, stores）

use std::future::Future;
use std::sync::Arc;

use crate::app::config::DocketConfig;
use crate::app::scheduler::JobScheduler;
use crate::app::webhooks::{DeliveryTracker, WebhookDeliveryHandler, WebhookService};
use crate::app::worker_pool::WorkerPool;
use crate::domain::{Decider, DefaultDecider, HandlerResult, TaskName};
use crate::error::RegistryError;
use crate::impls::{InMemoryDeliveryStore, InMemoryEndpointStore, ReqwestTransport};
use crate::ports::{
    Clock, DeliveryStore, EndpointStore, EventSink, FanoutEventSink, HttpTransport, SystemClock,
    TransportError, UlidGenerator,
};
use crate::queue::{InMemoryJobQueue, JobQueue};
use crate::typed::{Handler, HandlerRegistry, JobCall, Task};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .register::<AnalyzeDocument, _>(AnalyzeHandler)?
///     .expect_tasks(&["document_analysis"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_tasks() で期待される task_name を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
///
/// `webhook_delivery` は build() が自動で登録します。
pub struct AppBuilder {
    config: DocketConfig,
    registry: HandlerRegistry,
    expected_tasks: Option<Vec<String>>,
    clock: Arc<dyn Clock>,
    decider: Arc<dyn Decider>,
    transport: Option<Arc<dyn HttpTransport>>,
    endpoints: Option<Arc<dyn EndpointStore>>,
    deliveries: Option<Arc<dyn DeliveryStore>>,
    sinks: Vec<Arc<dyn EventSink>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error("worker_count must be at least 1")]
    NoWorkers,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("http transport: {0}")]
    Transport(#[from] TransportError),
}

impl AppBuilder {
    /// 新しい AppBuilder を作成
    pub fn new() -> Self {
        Self {
            config: DocketConfig::default(),
            registry: HandlerRegistry::new(),
            expected_tasks: None,
            clock: Arc::new(SystemClock),
            decider: Arc::new(DefaultDecider::default()),
            transport: None,
            endpoints: None,
            deliveries: None,
            sinks: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: DocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Handler を登録
    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// 型なしの async fn を handler として登録
    pub fn register_fn<F, Fut>(mut self, task_name: &str, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(JobCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_fn(task_name, f)?;
        Ok(self)
    }

    /// 期待される task_name のリストを設定
    pub fn expect_tasks(mut self, task_names: &[&str]) -> Self {
        self.expected_tasks = Some(task_names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    /// Defaults to [`ReqwestTransport`].
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_endpoint_store(mut self, store: Arc<dyn EndpointStore>) -> Self {
        self.endpoints = Some(store);
        self
    }

    pub fn with_delivery_store(mut self, store: Arc<dyn DeliveryStore>) -> Self {
        self.deliveries = Some(store);
        self
    }

    /// Receives every job transition after the delivery tracker.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// AppBuilder を構築して App を生成し、ワーカーを起動
    ///
    /// # 検証
    /// - worker_count が 0 でないこと
    /// - expect_tasks() で設定された task_name が全て登録されているか
    /// - `webhook_delivery` が利用者によって登録されていないこと
    ///
    /// ワーカーを spawn するので tokio runtime の中で呼ぶこと。
    pub fn build(self) -> Result<App, BuildError> {
        let AppBuilder {
            config,
            mut registry,
            expected_tasks,
            clock,
            decider,
            transport,
            endpoints,
            deliveries,
            sinks,
        } = self;

        if config.worker_count == 0 {
            return Err(BuildError::NoWorkers);
        }

        let transport: Arc<dyn HttpTransport> = match transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let delivery_handler = Arc::new(WebhookDeliveryHandler::new(
            transport,
            config.webhook.clone(),
        ));
        registry.register_dyn(TaskName::WEBHOOK_DELIVERY, delivery_handler.clone())?;

        if let Some(expected_tasks) = &expected_tasks {
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|name| !registry.contains(name))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }

        let endpoints: Arc<dyn EndpointStore> =
            endpoints.unwrap_or_else(|| Arc::new(InMemoryEndpointStore::new()));
        let deliveries: Arc<dyn DeliveryStore> =
            deliveries.unwrap_or_else(|| Arc::new(InMemoryDeliveryStore::new()));

        let tracker: Arc<dyn EventSink> =
            Arc::new(DeliveryTracker::new(deliveries.clone(), clock.clone()));
        let mut fanout = FanoutEventSink::new(vec![tracker]);
        for sink in sinks {
            fanout.push(sink);
        }
        let events: Arc<dyn EventSink> = Arc::new(fanout);

        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new(clock.clone(), decider));
        let registry = Arc::new(registry);

        let scheduler = Arc::new(JobScheduler::new(
            queue.clone(),
            registry.clone(),
            clock.clone(),
            ids.clone(),
            events.clone(),
        ));
        let webhooks = Arc::new(WebhookService::new(
            endpoints,
            deliveries,
            scheduler.clone(),
            delivery_handler,
            clock,
            ids,
            config.webhook.event_catalog.clone(),
        ));
        let workers = WorkerPool::spawn(config.worker_count, queue.clone(), registry, events);

        Ok(App {
            scheduler,
            webhooks,
            workers,
            queue,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は起動済みのアプリケーション
///
/// - `scheduler`: ジョブの投入・照会・取消
/// - `webhooks`: エンドポイント管理と配信
pub struct App {
    pub scheduler: Arc<JobScheduler>,
    pub webhooks: Arc<WebhookService>,
    workers: WorkerPool,
    queue: Arc<dyn JobQueue>,
}

impl App {
    pub fn worker_count(&self) -> usize {
        self.workers.size()
    }

    /// Stop taking new jobs, wait for in-flight attempts, then close the queue.
    pub async fn shutdown(self) {
        self.workers.shutdown_and_join().await;
        self.queue.close();
    }
}
