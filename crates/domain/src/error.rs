use serde::Serialize;

/// Shared error type used across all waypoint crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("version conflict on itinerary {id}: expected {expected}, store has {actual}")]
    VersionConflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("knowledge backend: {0}")]
    Knowledge(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn-level error taxonomy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The error kinds the streaming agent loop may surface to a caller,
/// carried inside a terminal `error` event.
///
/// Tool-level failures never reach this taxonomy: they stay inside the
/// stream as failed `tool_result` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SessionNotFound,
    SessionBusy,
    ItineraryNotFound,
    InvalidArguments,
    ToolExecutionFailed,
    LlmApiError,
    CostLimitExceeded,
    ContextLimitExceeded,
}

impl ErrorKind {
    /// Whether a caller may retry the same request unchanged.
    pub fn retryable(self) -> bool {
        matches!(self, Self::SessionBusy | Self::LlmApiError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let v = serde_json::to_value(ErrorKind::CostLimitExceeded).unwrap();
        assert_eq!(v, serde_json::json!("cost_limit_exceeded"));
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::SessionBusy.retryable());
        assert!(ErrorKind::LlmApiError.retryable());
        assert!(!ErrorKind::ContextLimitExceeded.retryable());
        assert!(!ErrorKind::SessionNotFound.retryable());
    }
}
