//! EventSink port - ジョブ状態遷移の購読
//!
//! Worker/scheduler はロックを解放した後に emit します。
//! Sink の失敗はジョブの状態に影響しません（ログのみ）。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::JobEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &JobEvent);
}

/// Does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event: &JobEvent) {}
}

/// Forwards each event to every inner sink, in registration order.
#[derive(Default, Clone)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    async fn emit(&self, event: &JobEvent) {
        for sink in &self.sinks {
            sink.emit(event).await;
        }
    }
}
