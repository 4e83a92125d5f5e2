//! # dipeo-engine — token-based dataflow execution core
//!
//! `dipeo-engine` schedules directed diagrams of heterogeneous work units
//! ("nodes") — LLM calls, conditional branches, code blocks, API calls,
//! sub-diagrams, and database/file operations — using readiness derived
//! from token occupancy rather than node status, so loops, branches, and
//! fan-in joins fall out of a small set of primitives instead of special
//! cases in the scheduler.
//!
//! ## Core concepts
//!
//! ### 1. Tokens, not status
//!
//! A node becomes ready when its inbound edges hold unconsumed tokens
//! satisfying its [`JoinPolicy`](dipeo_tokens::JoinPolicy) — never when
//! some other node finishes. [`NodeState`](state::NodeState) exists for
//! observation only; the scheduler never reads it to decide what runs
//! next.
//!
//! ### 2. Epochs isolate loop iterations
//!
//! A diagram may contain cycles. Edges whose target is not topologically
//! after their source are *back-edges*; a token emitted on one is tagged
//! with the next epoch, so tokens from iteration N of a loop body never
//! leak into iteration N+1's readiness check. See
//! [`ExecutableDiagram::classify_back_edges`](diagram::ExecutableDiagram::classify_back_edges).
//!
//! ### 3. Handlers are pure over (config, inputs, services)
//!
//! Every node type maps to a [`Handler`](handlers::Handler) resolved once
//! per invocation from the [`HandlerRegistry`](handlers::HandlerRegistry).
//! Handlers never raise across the scheduler boundary — a recoverable
//! failure becomes an error envelope on the node's default output, which
//! the scheduler records and, depending on `handles_errors`, may or may
//! not forward downstream.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use dipeo_engine::api::{Engine, ExecutionOptions};
//! use dipeo_engine::diagram::{ExecutableDiagram, Node, NodeKind, Edge, EdgeTransform};
//! use dipeo_engine::handlers::{HandlerRegistry, HandlerServices};
//! use dipeo_tokens::{EdgeId, ExecutionId, NodeId};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut diagram = ExecutableDiagram::new(NodeId::from("START"));
//!     diagram.add_node(Node::new("START", NodeKind::Start));
//!     diagram.add_node(Node::new("p1", NodeKind::PersonJob));
//!     diagram.add_node(Node::new("end", NodeKind::Endpoint));
//!     diagram.add_edge(Edge {
//!         id: EdgeId::from("e1"), source_node: NodeId::from("START"),
//!         source_handle: "default".into(), target_node: NodeId::from("p1"),
//!         target_handle: "default".into(), transform: EdgeTransform::default(),
//!     });
//!     diagram.add_edge(Edge {
//!         id: EdgeId::from("e2"), source_node: NodeId::from("p1"),
//!         source_handle: "default".into(), target_node: NodeId::from("end"),
//!         target_handle: "default".into(), transform: EdgeTransform::default(),
//!     });
//!
//!     let engine = Engine::new(HandlerRegistry::with_defaults(), HandlerServices::default());
//!     let id = engine.start(ExecutionId::from("exec1"), diagram, ExecutionOptions::default()).unwrap();
//!     let result = engine.wait(&id).await.unwrap();
//!     println!("{:?}: {:?}", result.status, result.outputs);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   ExecutableDiagram (read-only)
//!          │
//!          ▼
//!   ┌────────────────┐     ┌──────────────┐
//!   │   Scheduler     │◀───▶│ TokenManager │  per-edge FIFOs, epochs
//!   │  ready-set loop  │     └──────────────┘
//!   └───────┬─────────┘
//!           │ consume_inbound → resolve → run handler → emit_outputs
//!           ▼
//!   ┌────────────────┐     ┌──────────────┐
//!   │  InputResolver  │     │ StateTracker │  UI/history, never readiness
//!   └────────────────┘     └──────────────┘
//!           │
//!           ▼
//!   ┌────────────────┐     ┌──────────────┐
//!   │ HandlerRegistry │────▶│  EventBus    │  NODE_STARTED/COMPLETED/...
//!   └────────────────┘     └──────────────┘
//! ```
//!
//! ## Module organization
//!
//! - [`diagram`] — [`ExecutableDiagram`](diagram::ExecutableDiagram), node/edge model, topology, back-edge classification.
//! - [`rules`] — pure `can_connect`/`get_data_transform`/`merge_transforms`.
//! - [`resolver`] — [`InputResolver`](resolver::InputResolver): coercion, transforms, node-type strategies.
//! - [`context`] — [`ExecutionContext`](context::ExecutionContext) binding diagram/tokens/state/variables for one run.
//! - [`state`] — [`StateTracker`](state::StateTracker), observation-only node status.
//! - [`variables`] — [`ExecutionVariables`](variables::ExecutionVariables), execution-scoped control scalars.
//! - [`handlers`] — [`HandlerRegistry`](handlers::HandlerRegistry) and one module per node type.
//! - [`expr`] — minimal safe expression evaluator backing CONDITION/CODE_JOB.
//! - [`scheduler`] — the main ready-set loop.
//! - [`events`] — [`EventBus`](events::EventBus) fan-out with bounded lifecycle-event buffering.
//! - [`api`] — [`Engine`](api::Engine): `start`/`wait`/`cancel`/`state`.
//! - [`error`] — [`ExecutionError`](error::ExecutionError), the behavioral error taxonomy.
//!
//! Envelope, Token, TokenManager, and the opaque id types live in the
//! sibling `dipeo-tokens` crate; external collaborators (LLM, HTTP, blob
//! store, ...) live in `dipeo-services`.

pub mod api;
pub mod context;
pub mod diagram;
pub mod error;
pub mod events;
pub mod expr;
pub mod handlers;
pub mod resolver;
pub mod rules;
pub mod scheduler;
pub mod state;
pub mod variables;

pub use api::{Engine, EngineSubDiagramExecutor, ExecutionOptions, ExecutionSnapshot};
pub use context::ExecutionContext;
pub use diagram::{Edge, EdgeTransform, ExecutableDiagram, Node, NodeKind};
pub use error::{ExecutionError, Result};
pub use events::{Event, EventBus};
pub use handlers::{Handler, HandlerRegistry, HandlerServices};
pub use resolver::{InputResolver, ResolvedInput, ResolvedInputs};
pub use scheduler::{ExecutionResult, ExecutionStatus};
pub use state::{ExecutionSummary, NodeState, NodeStatus, StateTracker};
pub use variables::ExecutionVariables;
