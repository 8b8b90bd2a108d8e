//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（時刻、ID、HTTP、ストレージ）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。ジョブキュー自体の port は `crate::queue` にあります。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod transport;
pub mod webhook_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, FanoutEventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
pub use self::webhook_store::{DeliveryStore, EndpointStore};
