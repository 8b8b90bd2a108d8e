use thiserror::Error;

/// Malformed submission; returned synchronously and never enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no handler registered for task_name={0}")]
    UnknownTask(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfBounds {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("invalid webhook url: {0:?} (expected http or https)")]
    InvalidUrl(String),

    #[error("webhook endpoint must subscribe to at least one event")]
    EmptyEvents,

    #[error("webhook endpoint name must not be empty")]
    EmptyName,

    #[error("invalid webhook header {0:?}")]
    InvalidHeader(String),

    #[error("malformed event type: {0:?}")]
    InvalidEventType(String),

    #[error("event type {0} is not in the configured catalog")]
    UnknownEventType(String),
}

/// Handler registration failures (startup time).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("handler for task_name={0} is already registered")]
    AlreadyRegistered(String),

    #[error("malformed task_name: {0:?}")]
    InvalidName(String),
}

/// Failures of the endpoint/delivery stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error of the public service API.
#[derive(Debug, Error)]
pub enum DocketError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] crate::app::config::ConfigError),

    #[error(transparent)]
    Build(#[from] crate::app::builder::BuildError),
}
