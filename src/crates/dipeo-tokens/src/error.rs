//! Error types for envelope and token operations.

use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, TokenError>;

/// Errors raised by [`crate::Envelope`] and [`crate::TokenManager`].
#[derive(Debug, Error)]
pub enum TokenError {
    /// An accessor was called that doesn't match the envelope's `content_type`.
    #[error("content type mismatch: envelope is {actual:?}, accessor expected {expected:?}")]
    ContentTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A join/concurrency policy configuration was invalid (e.g. `k_of_n(0)`).
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Attempted to consume from an edge that does not exist on the node.
    #[error("unknown inbound edge for node: {0}")]
    UnknownEdge(String),
}
