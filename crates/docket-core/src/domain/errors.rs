//! Errors - 実行エラーの分類
//!
//! Handler の呼び出し結果は例外ではなく `HandlerResult`（タグ付き Result）で表現し、
//! retry 判定（Decider）はこの値と試行回数だけを見る純粋関数になります。

use serde::{Deserialize, Serialize};

/// Classification of a failed attempt.
///
/// All three kinds are retried identically; the kind only changes what gets
/// recorded so operators can tell a slow handler from a broken one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The handler returned an error (or panicked).
    Handler,
    /// The handler did not finish within `timeout_seconds`.
    Timeout,
    /// A webhook POST failed: non-2xx status or transport failure.
    Delivery,
}

/// Error produced by one job attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Handler, message)
    }

    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("job timed out after {timeout_seconds}s"),
        )
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Delivery, message)
    }
}

/// Result of invoking a handler once.
pub type HandlerResult = Result<serde_json::Value, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_is_distinguishable() {
        let err = JobError::timeout(10);
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.message, "job timed out after 10s");
    }

    #[test]
    fn kind_serializes_snake_case() {
        let s = serde_json::to_string(&ErrorKind::Delivery).unwrap();
        assert_eq!(s, "\"delivery\"");
    }
}
