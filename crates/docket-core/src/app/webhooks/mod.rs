//! Webhooks - endpoint registry, fan-out dispatcher and delivery tracking.
//!
//! Deliveries reuse the job machinery: each one is a `webhook_delivery` job,
//! and `DeliveryTracker` keeps the delivery row in step with that job.

pub mod delivery;
pub mod service;
pub mod signing;
pub mod tracker;

pub use self::delivery::WebhookDeliveryHandler;
pub use self::service::WebhookService;
pub use self::tracker::DeliveryTracker;
