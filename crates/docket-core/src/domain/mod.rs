//! Domain model (IDs, job records, webhook entities, decisions, statistics).

pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod job;
pub mod stats;
pub mod task;
pub mod webhook;

pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{ErrorKind, HandlerResult, JobError};
pub use events::JobEvent;
pub use ids::{DeliveryId, EndpointId, EventId, JobId, ParseIdError};
pub use job::{JobPriority, JobRecord, JobRequest, JobResult, JobStatus};
pub use stats::{DeliveryStatistics, JobStatistics};
pub use task::TaskName;
pub use webhook::{
    DeliveryStatus, EndpointTestResult, EndpointUpdate, EventType, NewEndpoint, WebhookDelivery,
    WebhookEndpoint, WebhookEnvelope,
};
