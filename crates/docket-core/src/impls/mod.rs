//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryEndpointStore / InMemoryDeliveryStore**: 開発用・テスト用の正本
//! - **ReqwestTransport**: Webhook POST の本番用 HTTP クライアント
//!
//! ジョブキューの in-memory 実装は `crate::queue` にあります。

pub mod inmem_webhook_store;
pub mod reqwest_transport;

// 主要な型を再エクスポート
pub use self::inmem_webhook_store::{InMemoryDeliveryStore, InMemoryEndpointStore};
pub use self::reqwest_transport::ReqwestTransport;
