//! Error taxonomy for the execution core (§7).
//!
//! The taxonomy is behavioral, not structural: `DiagramStructural` errors
//! are raised before execution starts, `ResolutionError`s become error
//! envelopes on the affected node, `HandlerError`s are already error
//! envelopes by the time they reach here, and `FatalExecution` stops the
//! whole run. Handlers never raise across the scheduler boundary — see
//! `dipeo_services::ServiceError` for the interface-level error type they
//! convert into an error envelope themselves.

use dipeo_tokens::TokenError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecutionError>;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Invalid edge, missing handle, or an unclassified cycle. Raised by
    /// `ExecutableDiagram::validate` before any node executes.
    #[error("diagram structure invalid: {0}")]
    DiagramStructural(String),

    #[error("missing required input '{handle}' on node '{node}'")]
    MissingRequiredInput { node: String, handle: String },

    #[error("type mismatch on node '{node}' input '{handle}': {detail}")]
    TypeMismatch {
        node: String,
        handle: String,
        detail: String,
    },

    #[error("content type mismatch on node '{node}': {source}")]
    ContentTypeMismatch {
        node: String,
        #[source]
        source: TokenError,
    },

    /// Scheduler-internal invariant broken (unknown node type at runtime,
    /// a token-layer error that should be structurally impossible). This
    /// is the only variant that terminates the execution with FAILED
    /// regardless of which nodes are still pending.
    #[error("fatal execution error: {0}")]
    Fatal(String),
}

impl ExecutionError {
    pub fn tag(&self) -> &'static str {
        match self {
            ExecutionError::DiagramStructural(_) => "diagram_structural",
            ExecutionError::MissingRequiredInput { .. } => "missing_required_input",
            ExecutionError::TypeMismatch { .. } => "type_mismatch",
            ExecutionError::ContentTypeMismatch { .. } => "content_type_mismatch",
            ExecutionError::Fatal(_) => "fatal",
        }
    }
}
