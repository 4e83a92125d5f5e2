//! Envelope and token-queue primitives for the DiPeO execution core.
//!
//! This crate is the leaf layer of the engine (§2, items 1-2): immutable
//! [`Envelope`] messages and the per-edge, per-epoch [`TokenManager`] that
//! decides node readiness. It has no notion of diagrams, handlers, or
//! scheduling — those live in `dipeo-engine`, which depends on this crate.

pub mod envelope;
pub mod error;
pub mod ids;
pub mod token;

pub use envelope::{ContentType, Envelope, EnvelopeBody, Message, MessageRole, MetaValue};
pub use error::{Result, TokenError};
pub use ids::{Direction, EdgeId, ExecutionId, HandleId, NodeId, BRANCH_FALSE, BRANCH_TRUE, ENDPOINT_NODE, START_NODE};
pub use token::{ConcurrencyPolicy, InboundEdge, JoinPolicy, OutboundEdge, Token, TokenManager, Topology};
