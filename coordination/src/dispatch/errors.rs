//! Backend call error taxonomy with retry classification.
//!
//! | Kind             | Retriable | Panel slot           |
//! |------------------|-----------|----------------------|
//! | Unreachable      | yes       | failure marker       |
//! | Timeout          | yes       | failure marker       |
//! | RateLimited      | yes       | failure marker       |
//! | InvalidResponse  | no        | failure marker       |
//! | NotConfigured    | no        | failure marker       |

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::BackendId;

/// Coarse failure class, carried in report failure markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    Timeout,
    RateLimited,
    InvalidResponse,
    NotConfigured,
}

impl FailureKind {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Unreachable | Self::Timeout | Self::RateLimited)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => write!(f, "unreachable"),
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::NotConfigured => write!(f, "not_configured"),
        }
    }
}

/// Error from a single `complete` call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Network failure or non-success HTTP status.
    #[error("{backend} unreachable: {message}")]
    Unreachable { backend: BackendId, message: String },

    #[error("{backend} timed out after {after:?}")]
    Timeout { backend: BackendId, after: Duration },

    #[error("{backend} rate limited: {message}")]
    RateLimited { backend: BackendId, message: String },

    /// The backend answered but the payload had no usable text.
    #[error("{backend} returned an invalid response: {message}")]
    InvalidResponse { backend: BackendId, message: String },

    /// No adapter is registered for this backend (usually a missing API key).
    #[error("{0} is not configured")]
    NotConfigured(BackendId),
}

impl DispatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unreachable { .. } => FailureKind::Unreachable,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::InvalidResponse { .. } => FailureKind::InvalidResponse,
            Self::NotConfigured(_) => FailureKind::NotConfigured,
        }
    }

    pub fn backend(&self) -> BackendId {
        match self {
            Self::Unreachable { backend, .. }
            | Self::Timeout { backend, .. }
            | Self::RateLimited { backend, .. }
            | Self::InvalidResponse { backend, .. } => *backend,
            Self::NotConfigured(backend) => *backend,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }

    pub fn unreachable(backend: BackendId, message: impl Into<String>) -> Self {
        Self::Unreachable {
            backend,
            message: message.into(),
        }
    }

    pub fn invalid_response(backend: BackendId, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            backend,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_retriable() {
        let err = DispatchError::RateLimited {
            backend: BackendId::OpenAi,
            message: "429".into(),
        };
        assert!(err.is_retriable());
        assert_eq!(err.kind(), FailureKind::RateLimited);
        assert_eq!(err.backend(), BackendId::OpenAi);
    }

    #[test]
    fn invalid_response_is_terminal() {
        let err = DispatchError::invalid_response(BackendId::Gemini, "no candidates");
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("gemini"));
    }

    #[test]
    fn not_configured_is_terminal() {
        let err = DispatchError::NotConfigured(BackendId::DeepSeek);
        assert!(!err.is_retriable());
        assert_eq!(err.to_string(), "deepseek is not configured");
    }

    #[test]
    fn failure_kind_display() {
        assert_eq!(FailureKind::Timeout.to_string(), "timeout");
        assert_eq!(FailureKind::InvalidResponse.to_string(), "invalid_response");
    }
}
