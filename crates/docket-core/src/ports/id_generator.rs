//! IdGenerator port - ID 生成の抽象化
//!
//! テスト容易性のために trait として抽象化しています。
//! - **UlidGenerator**: Clock の時刻 + 乱数で ULID を生成

use crate::domain::ids::{DeliveryId, EndpointId, EventId, JobId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    fn generate_endpoint_id(&self) -> EndpointId;

    fn generate_delivery_id(&self) -> DeliveryId;

    fn generate_event_id(&self) -> EventId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// FixedClock を渡すと timestamp 部分が固定されます（ランダム部分は毎回異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_endpoint_id(&self) -> EndpointId {
        EndpointId::from(self.next_ulid())
    }

    fn generate_delivery_id(&self) -> DeliveryId {
        DeliveryId::from(self.next_ulid())
    }

    fn generate_event_id(&self) -> EventId {
        EventId::from(self.next_ulid())
    }
}
