//! App - アプリケーション層
//!
//! このモジュールは、ports と queue を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **JobScheduler**: ジョブの投入・照会・取消・統計
//! - **WorkerPool**: 固定数のワーカー（lease→handle→complete/fail→emit）
//! - **WebhookService**: エンドポイント管理とイベント配信
//! - **DocketConfig**: 実行時設定

pub mod builder;
pub mod config;
pub mod scheduler;
pub mod webhooks;
pub mod worker_pool;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::config::{ConfigError, DocketConfig, EventCatalog, WebhookConfig};
pub use self::scheduler::JobScheduler;
pub use self::webhooks::WebhookService;
pub use self::worker_pool::WorkerPool;
