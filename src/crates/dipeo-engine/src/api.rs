//! Public invocation surface (§6): `start`/`wait`/`cancel`/`state`.
//!
//! Grounded on the teacher's `runtime.rs` (`Runtime::invoke`/`get_runtime`
//! process-wide handle), narrowed from a single compiled-graph runtime to
//! one `Engine` per process tracking many concurrent executions.

use crate::context::ExecutionContext;
use crate::diagram::ExecutableDiagram;
use crate::events::EventBus;
use crate::handlers::{HandlerRegistry, HandlerServices};
use crate::scheduler::{self, ExecutionResult};
use crate::state::{ExecutionSummary, NodeState};
use async_trait::async_trait;
use dipeo_tokens::{ConcurrencyPolicy, Envelope, ExecutionId, NodeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub strict_mode: bool,
    pub inputs: HashMap<String, serde_json::Value>,
}

pub struct ExecutionSnapshot {
    pub node_states: HashMap<NodeId, NodeState>,
    pub summary: ExecutionSummary,
}

struct ExecutionHandle {
    ctx: Arc<ExecutionContext>,
    task: Mutex<Option<tokio::task::JoinHandle<ExecutionResult>>>,
    result: Mutex<Option<ExecutionResult>>,
    notify: Notify,
}

/// Process-wide entry point. One `Engine` owns the handler registry,
/// external services, and event bus shared by every execution it starts.
pub struct Engine {
    registry: Arc<HandlerRegistry>,
    services: Arc<HandlerServices>,
    events: Arc<EventBus>,
    executions: RwLock<HashMap<ExecutionId, Arc<ExecutionHandle>>>,
    default_concurrency: ConcurrencyPolicy,
}

impl Engine {
    pub fn new(registry: HandlerRegistry, services: HandlerServices) -> Self {
        Self::with_options(registry, services, dipeo_support::ExecutionOptions::default())
    }

    /// §5/§ambient config: `options.event_buffer_size` sizes the event
    /// bus and `options.default_bounded_concurrency` is the width a node
    /// falls back on when it declares no explicit concurrency policy.
    pub fn with_options(
        registry: HandlerRegistry,
        services: HandlerServices,
        options: dipeo_support::ExecutionOptions,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            services: Arc::new(services),
            events: Arc::new(EventBus::new(options.event_buffer_size)),
            executions: RwLock::new(HashMap::new()),
            default_concurrency: ConcurrencyPolicy::Bounded(options.default_bounded_concurrency),
        }
    }

    /// Loads `dipeo_support::ExecutionOptions` from `{prefix}*` environment
    /// variables rather than hardcoded defaults.
    pub fn from_env(
        prefix: &str,
        registry: HandlerRegistry,
        services: HandlerServices,
    ) -> dipeo_support::Result<Self> {
        use dipeo_support::config::ConfigBuilder;
        let options = dipeo_support::ExecutionOptions::from_env(prefix)?;
        Ok(Self::with_options(registry, services, options))
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Non-blocking: validates the diagram, then spawns the scheduler
    /// loop on a background task and returns immediately.
    pub fn start(
        &self,
        execution_id: ExecutionId,
        diagram: ExecutableDiagram,
        options: ExecutionOptions,
    ) -> crate::error::Result<ExecutionId> {
        diagram.validate()?;
        let ctx = Arc::new(ExecutionContext::new(
            execution_id.clone(),
            Arc::new(diagram),
            options.strict_mode,
            options.inputs,
            self.default_concurrency,
        ));

        let task = tokio::spawn(scheduler::run(
            ctx.clone(),
            self.registry.clone(),
            self.services.clone(),
            self.events.clone(),
        ));

        let handle = Arc::new(ExecutionHandle {
            ctx,
            task: Mutex::new(Some(task)),
            result: Mutex::new(None),
            notify: Notify::new(),
        });
        self.executions.write().unwrap().insert(execution_id.clone(), handle);
        Ok(execution_id)
    }

    /// Blocks until `execution_id` reaches a terminal status. Safe to
    /// call from multiple callers concurrently; only the first actually
    /// awaits the scheduler task, the rest wait on a notification.
    pub async fn wait(&self, execution_id: &ExecutionId) -> Option<ExecutionResult> {
        let handle = self.executions.read().unwrap().get(execution_id).cloned()?;
        loop {
            if let Some(result) = handle.result.lock().unwrap().clone() {
                return Some(result);
            }
            let owned_task = handle.task.lock().unwrap().take();
            match owned_task {
                Some(task) => {
                    let result = task.await.unwrap_or_else(|e| ExecutionResult {
                        status: scheduler::ExecutionStatus::Failed,
                        outputs: HashMap::new(),
                        error: Some(format!("execution task panicked: {e}")),
                    });
                    *handle.result.lock().unwrap() = Some(result.clone());
                    handle.notify.notify_waiters();
                    return Some(result);
                }
                None => handle.notify.notified().await,
            }
        }
    }

    pub fn cancel(&self, execution_id: &ExecutionId) -> bool {
        match self.executions.read().unwrap().get(execution_id) {
            Some(handle) => {
                handle.ctx.cancel();
                true
            }
            None => false,
        }
    }

    pub fn state(&self, execution_id: &ExecutionId) -> Option<ExecutionSnapshot> {
        let handle = self.executions.read().unwrap().get(execution_id).cloned()?;
        Some(ExecutionSnapshot {
            node_states: handle.ctx.state.all_snapshots(),
            summary: handle.ctx.state.summary(),
        })
    }
}

/// SUB_DIAGRAM support (§4.6, §8 S6): the core satisfies
/// `dipeo_services::subdiagram::SubDiagramExecutor` over its own
/// `Engine`, so a SUB_DIAGRAM node recurses into this crate rather than
/// an external process. `register` holds named diagrams in memory —
/// resolving `diagram_ref` from a source format or store is out of
/// scope (§1).
pub struct EngineSubDiagramExecutor {
    engine: Arc<Engine>,
    diagrams: RwLock<HashMap<String, Arc<ExecutableDiagram>>>,
    next_id: AtomicU64,
}

impl EngineSubDiagramExecutor {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            diagrams: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, diagram_ref: impl Into<String>, diagram: ExecutableDiagram) {
        self.diagrams.write().unwrap().insert(diagram_ref.into(), Arc::new(diagram));
    }
}

#[async_trait]
impl dipeo_services::subdiagram::SubDiagramExecutor for EngineSubDiagramExecutor {
    async fn execute(
        &self,
        diagram_ref: &str,
        inputs: BTreeMap<String, Envelope>,
        _options: &dipeo_services::subdiagram::SubDiagramOptions,
    ) -> dipeo_services::error::Result<BTreeMap<String, Envelope>> {
        let diagram = self
            .diagrams
            .read()
            .unwrap()
            .get(diagram_ref)
            .cloned()
            .ok_or_else(|| dipeo_services::error::ServiceError::NotFound(diagram_ref.to_string()))?;

        let sub_inputs: HashMap<String, serde_json::Value> = inputs
            .into_iter()
            .map(|(handle, env)| {
                let value = env
                    .as_json()
                    .ok()
                    .cloned()
                    .unwrap_or_else(|| serde_json::Value::String(env.as_text().unwrap_or_default().to_string()));
                (handle, value)
            })
            .collect();

        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let execution_id = ExecutionId::from(format!("{diagram_ref}#{seq}"));
        self.engine
            .start(
                execution_id.clone(),
                (*diagram).clone(),
                ExecutionOptions { strict_mode: false, inputs: sub_inputs },
            )
            .map_err(|e| dipeo_services::error::ServiceError::Other(e.to_string()))?;

        let result = self
            .engine
            .wait(&execution_id)
            .await
            .ok_or_else(|| dipeo_services::error::ServiceError::Other("sub-diagram never completed".into()))?;

        if result.status != scheduler::ExecutionStatus::Completed {
            return Err(dipeo_services::error::ServiceError::Provider(
                result.error.unwrap_or_else(|| "sub-diagram execution failed".into()),
            ));
        }
        Ok(result.outputs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{start_id, Edge, EdgeTransform, Node, NodeKind};
    use dipeo_tokens::EdgeId;

    fn linear_diagram() -> ExecutableDiagram {
        let mut d = ExecutableDiagram::new(start_id());
        d.add_node(Node::new("START", NodeKind::Start));
        d.add_node(Node::new("echo", NodeKind::CodeJob).with_config(serde_json::json!({"op": "identity"})));
        d.add_node(Node::new("end", NodeKind::Endpoint));
        d.add_edge(Edge {
            id: EdgeId::from("e1"),
            source_node: NodeId::from("START"),
            source_handle: "default".into(),
            target_node: NodeId::from("echo"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        d.add_edge(Edge {
            id: EdgeId::from("e2"),
            source_node: NodeId::from("echo"),
            source_handle: "default".into(),
            target_node: NodeId::from("end"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        d
    }

    #[tokio::test]
    async fn start_then_wait_completes() {
        let engine = Engine::new(HandlerRegistry::with_defaults(), HandlerServices::default());
        let id = engine
            .start(ExecutionId::from("e1"), linear_diagram(), ExecutionOptions::default())
            .unwrap();
        let result = engine.wait(&id).await.unwrap();
        assert_eq!(result.status, scheduler::ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_execution_id_yields_none() {
        let engine = Engine::new(HandlerRegistry::with_defaults(), HandlerServices::default());
        assert!(engine.wait(&ExecutionId::from("nope")).await.is_none());
        assert!(!engine.cancel(&ExecutionId::from("nope")));
    }
}
