//! docket-core
//!
//! Background job scheduler and webhook delivery for a case-management backend.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, webhook, decision, events, stats）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, EventSink, HttpTransport, stores）
//! - **queue**: JobQueue trait と in-memory 実装、リトライのバックオフ
//! - **typed**: 型付き Task API（Task trait, Handler trait, HandlerRegistry）
//! - **impls**: ports の実装（in-memory stores, reqwest transport）
//! - **app**: アプリケーションロジック（builder, scheduler, worker_pool, webhooks）
//! - **observability**: キューの集計とログ初期化
//! - **error**: 公開 API のエラー型

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod typed;

pub use app::{App, AppBuilder, BuildError, DocketConfig, JobScheduler, WebhookService};
pub use error::{DocketError, RegistryError, StoreError, ValidationError};
