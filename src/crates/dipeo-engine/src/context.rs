//! ExecutionContext (§2 item 4): binds diagram, tokens, state, and
//! variables for one execution, and exposes the consume/emit surface
//! handlers and the scheduler share.

use crate::diagram::ExecutableDiagram;
use crate::resolver::InputResolver;
use crate::state::StateTracker;
use crate::variables::ExecutionVariables;
use dipeo_tokens::{ConcurrencyPolicy, Envelope, ExecutionId, NodeId, TokenManager};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub diagram: Arc<ExecutableDiagram>,
    pub tokens: Arc<Mutex<TokenManager>>,
    pub state: Arc<StateTracker>,
    pub variables: ExecutionVariables,
    pub resolver: Arc<InputResolver>,
    /// §5: the concurrency width a node falls back on when it declares no
    /// explicit `concurrency_policy` of its own.
    pub default_concurrency: ConcurrencyPolicy,
    cancelled: Arc<std::sync::atomic::AtomicBool>,
}

impl ExecutionContext {
    pub fn new(
        execution_id: ExecutionId,
        diagram: Arc<ExecutableDiagram>,
        strict_mode: bool,
        initial_inputs: HashMap<String, serde_json::Value>,
        default_concurrency: ConcurrencyPolicy,
    ) -> Self {
        let topology = diagram.build_topology();
        Self {
            execution_id,
            diagram,
            tokens: Arc::new(Mutex::new(TokenManager::new(topology))),
            state: Arc::new(StateTracker::new()),
            variables: ExecutionVariables::with_initial(initial_inputs),
            resolver: Arc::new(InputResolver::new(strict_mode)),
            default_concurrency,
            cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn current_epoch(&self) -> i64 {
        self.tokens.lock().unwrap().current_epoch()
    }

    pub fn emit_outputs(&self, node: &NodeId, outputs: HashMap<String, Envelope>, epoch: i64) {
        self.tokens.lock().unwrap().emit_outputs(node, outputs, epoch);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }
}
