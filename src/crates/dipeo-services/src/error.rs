//! Errors raised by external-interface implementations (§7 HandlerError).
//!
//! Shaped after the teacher's `LlmError`: one enum covering every
//! collaborator in this crate rather than one per trait, since handlers
//! surface them all the same way — as an error envelope, never across
//! the scheduler boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("secret not found for service: {0}")]
    SecretNotFound(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("rate limit exceeded: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Whether a handler's own retry policy (§7 HandlerError) should
    /// consider resubmitting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Transport(_)
                | ServiceError::Unavailable(_)
                | ServiceError::RateLimited { .. }
                | ServiceError::Timeout(_)
        )
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Authentication(_) | ServiceError::SecretNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
