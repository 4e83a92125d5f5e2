//! Scheduler (§4.1, §2 item 8): drives one execution from START to a
//! terminal condition. Grounded on the teacher's `pregel::executor`
//! superstep loop — ready-set computation, bounded concurrent dispatch,
//! then a barrier before the next round — generalized from fixed
//! supersteps to readiness driven by token occupancy and epochs.

use crate::context::ExecutionContext;
use crate::diagram::{Node, NodeKind};
use crate::events::{Event, EventBus};
use crate::handlers::{HandlerRegistry, HandlerServices};
use dipeo_tokens::{ConcurrencyPolicy, Envelope, NodeId};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub outputs: HashMap<String, Envelope>,
    pub error: Option<String>,
}

struct InFlight {
    counts: std::sync::Mutex<HashMap<NodeId, usize>>,
}

impl InFlight {
    fn new() -> Self {
        Self { counts: std::sync::Mutex::new(HashMap::new()) }
    }
    fn count(&self, node: &NodeId) -> usize {
        self.counts.lock().unwrap().get(node).copied().unwrap_or(0)
    }
    fn total(&self) -> usize {
        self.counts.lock().unwrap().values().sum()
    }
    fn incr(&self, node: &NodeId) {
        *self.counts.lock().unwrap().entry(node.clone()).or_insert(0) += 1;
    }
    fn decr(&self, node: &NodeId) {
        let mut counts = self.counts.lock().unwrap();
        if let Some(c) = counts.get_mut(node) {
            *c = c.saturating_sub(1);
        }
    }
}

fn concurrency_allows(policy: ConcurrencyPolicy, in_flight: usize) -> bool {
    match policy {
        ConcurrencyPolicy::Singleton => in_flight == 0,
        ConcurrencyPolicy::PerToken => true,
        ConcurrencyPolicy::Bounded(n) => in_flight < n,
    }
}

/// §4.1 "can_execute_in_loop": a node with no `max_iteration` can always
/// run again; one with a cap stops being selectable once its cumulative
/// `execution_count` reaches it, and is marked MAXITER_REACHED.
fn can_execute_in_loop(node: &Node, ctx: &ExecutionContext) -> bool {
    match node.max_iteration {
        None => true,
        Some(max) => ctx.state.execution_count(&node.id) < max,
    }
}

/// One round's outcome for a single node invocation, carried back to the
/// scheduler loop across the `tokio::spawn` boundary.
struct NodeOutcome {
    node_id: NodeId,
    epoch: i64,
    outputs: HashMap<String, Envelope>,
    failed: Option<(String, String)>,
}

async fn run_node(
    node: Arc<Node>,
    ctx: Arc<ExecutionContext>,
    registry: Arc<HandlerRegistry>,
    services: Arc<HandlerServices>,
    epoch: i64,
) -> NodeOutcome {
    let consumed = ctx.tokens.lock().unwrap().consume_inbound(&node.id, node.join_policy);
    let consumed = match consumed {
        Ok(tokens) => tokens,
        Err(e) => {
            return NodeOutcome {
                node_id: node.id.clone(),
                epoch,
                outputs: HashMap::new(),
                failed: Some(("fatal".into(), e.to_string())),
            }
        }
    };
    let iteration = ctx.state.execution_count(&node.id);
    let resolved = ctx.resolver.resolve(&node, &ctx.diagram, consumed, iteration, epoch);
    let resolved = match resolved {
        Ok(r) => r,
        Err(e) => {
            return NodeOutcome {
                node_id: node.id.clone(),
                epoch,
                outputs: HashMap::new(),
                failed: Some((e.tag().to_string(), e.to_string())),
            }
        }
    };

    let Some(handler) = registry.get(&node.kind) else {
        return NodeOutcome {
            node_id: node.id.clone(),
            epoch,
            outputs: HashMap::new(),
            failed: Some(("fatal".into(), format!("no handler registered for {}", node.kind.label()))),
        };
    };

    let outputs = dipeo_support::logging::timed(node.id.as_str(), handler.run(&node, &resolved, &services)).await;
    // A node that declares `handles_errors` exists to receive error
    // envelopes; relaying one through its own output is its normal
    // completion, not a failure of this node.
    let failed = if node.handles_errors {
        None
    } else {
        outputs
            .get("default")
            .filter(|e| e.has_error())
            .map(|e| (e.error.clone().unwrap_or_default(), e.as_text().unwrap_or_default().to_string()))
    };
    NodeOutcome { node_id: node.id.clone(), epoch, outputs, failed }
}

/// Drive `ctx.diagram` to completion (§4.1). `services` are the
/// external collaborators handlers may call; any left `None` fail their
/// node type with a `missing_service` error envelope.
pub async fn run(
    ctx: Arc<ExecutionContext>,
    registry: Arc<HandlerRegistry>,
    services: Arc<HandlerServices>,
    events: Arc<EventBus>,
) -> ExecutionResult {
    events.publish(&ctx.execution_id, Event::ExecutionStarted { execution_id: ctx.execution_id.clone() });

    // START has no inbound edges; TokenManager has no opinion on it, so
    // the scheduler seeds it directly (§3 "driven externally").
    let start = ctx.diagram.start.clone();
    ctx.state.transition_to_running(&start, 0);
    ctx.state.transition_to_completed(&start, Envelope::text("", start.clone()));
    {
        let start_outputs = HashMap::from([(
            "default".to_string(),
            Envelope::object(serde_json::Value::Object(
                ctx.variables.all().into_iter().collect(),
            ), start.clone()),
        )]);
        ctx.emit_outputs(&start, start_outputs, 0);
    }

    let in_flight = InFlight::new();
    let mut tasks: FuturesUnordered<tokio::task::JoinHandle<NodeOutcome>> = FuturesUnordered::new();
    let mut had_failure = false;
    let mut fatal = false;

    loop {
        if ctx.is_cancelled() {
            // stop selecting new nodes; drain whatever's in flight.
            if in_flight.total() == 0 {
                break;
            }
            if let Some(joined) = tasks.next().await {
                if let Ok(outcome) = joined {
                    in_flight.decr(&outcome.node_id);
                }
            }
            continue;
        }

        let epoch = ctx.current_epoch();
        let mut ready: Vec<Arc<Node>> = Vec::new();
        for node in ctx.diagram.nodes.values() {
            if matches!(node.kind, NodeKind::Start) {
                continue;
            }
            let join = node.join_policy;
            let has_inputs = ctx.tokens.lock().unwrap().has_new_inputs(&node.id, join);
            if !has_inputs {
                continue;
            }
            if !can_execute_in_loop(node, &ctx) {
                // drain and discard: further consumption is suppressed.
                let _ = ctx.tokens.lock().unwrap().consume_inbound(&node.id, join);
                ctx.state.transition_to_max_iter(&node.id);
                continue;
            }
            let policy = node.concurrency_policy.unwrap_or(ctx.default_concurrency);
            if !concurrency_allows(policy, in_flight.count(&node.id)) {
                continue;
            }
            ready.push(Arc::new(node.clone()));
        }

        if ready.is_empty() {
            if in_flight.total() > 0 {
                if let Some(joined) = tasks.next().await {
                    match joined {
                        Ok(outcome) => {
                            in_flight.decr(&outcome.node_id);
                            had_failure |= settle(&ctx, &events, &outcome);
                        }
                        Err(e) => {
                            warn!(error = %e, "node task panicked");
                            fatal = true;
                        }
                    }
                }
                continue;
            }
            if ctx.tokens.lock().unwrap().has_pending_epoch() {
                ctx.tokens.lock().unwrap().begin_epoch();
                continue;
            }
            break;
        }

        // deterministic tie-break: epoch asc, edge-input-age asc, node-id lexicographic.
        ready.sort_by(|a, b| {
            let age_a = ctx.tokens.lock().unwrap().oldest_seq(&a.id);
            let age_b = ctx.tokens.lock().unwrap().oldest_seq(&b.id);
            age_a.cmp(&age_b).then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });

        for node in ready {
            in_flight.incr(&node.id);
            ctx.state.transition_to_running(&node.id, epoch);
            events.publish(
                &ctx.execution_id,
                Event::NodeStarted { execution_id: ctx.execution_id.clone(), node: node.id.clone() },
            );
            let ctx = ctx.clone();
            let registry = registry.clone();
            let services = services.clone();
            tasks.push(tokio::spawn(run_node(node, ctx, registry, services, epoch)));
        }

        if let Some(joined) = tasks.next().await {
            match joined {
                Ok(outcome) => {
                    in_flight.decr(&outcome.node_id);
                    had_failure |= settle(&ctx, &events, &outcome);
                }
                Err(e) => {
                    warn!(error = %e, "node task panicked");
                    fatal = true;
                }
            }
        }
    }

    let outputs = collect_endpoint_outputs(&ctx);
    let summary = ctx.state.summary();

    let status = if ctx.is_cancelled() {
        events.publish(
            &ctx.execution_id,
            Event::ExecutionCancelled { execution_id: ctx.execution_id.clone() },
        );
        ExecutionStatus::Cancelled
    } else if fatal || had_failure || summary.first_failed_node.is_some() {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::Completed
    };

    let status_label = match status {
        ExecutionStatus::Completed => "COMPLETED",
        ExecutionStatus::Failed => "FAILED",
        ExecutionStatus::Cancelled => "CANCELLED",
    };
    events.publish(
        &ctx.execution_id,
        Event::ExecutionCompleted { execution_id: ctx.execution_id.clone(), status: status_label },
    );

    ExecutionResult { status, outputs, error: summary.first_error }
}

/// Apply a completed node's outcome to state + tokens + events. Returns
/// whether this outcome represents a (non-fatal) failure.
fn settle(ctx: &Arc<ExecutionContext>, events: &Arc<EventBus>, outcome: &NodeOutcome) -> bool {
    let node = ctx.diagram.nodes.get(&outcome.node_id).expect("outcome for unknown node");

    if let Some((tag, message)) = &outcome.failed {
        ctx.state.transition_to_failed(&outcome.node_id, tag.clone(), message.clone());
        events.publish(
            &ctx.execution_id,
            Event::NodeFailed {
                execution_id: ctx.execution_id.clone(),
                node: outcome.node_id.clone(),
                tag: tag.clone(),
                message: message.clone(),
            },
        );
        if tag == "fatal" {
            return true;
        }
    } else if let Some(primary) = outcome.outputs.get("default").cloned() {
        ctx.state.transition_to_completed(&outcome.node_id, primary);
    }

    if node.kind == NodeKind::Condition {
        if outcome.outputs.contains_key(dipeo_tokens::BRANCH_TRUE) {
            ctx.tokens.lock().unwrap().record_branch_decision(&outcome.node_id, outcome.epoch, true);
        } else if outcome.outputs.contains_key(dipeo_tokens::BRANCH_FALSE) {
            ctx.tokens.lock().unwrap().record_branch_decision(&outcome.node_id, outcome.epoch, false);
        }
    }

    // §7: an error envelope only reaches edges whose target declares
    // handles_errors; everywhere else it is recorded but not forwarded.
    let suppress: HashSet<_> = ctx
        .diagram
        .edges
        .iter()
        .filter(|e| e.source_node == outcome.node_id)
        .filter(|e| {
            outcome
                .outputs
                .get(&e.source_handle)
                .map(|env| env.has_error())
                .unwrap_or(false)
        })
        .filter(|e| ctx.diagram.nodes.get(&e.target_node).map(|n| !n.handles_errors).unwrap_or(true))
        .map(|e| e.id.clone())
        .collect();

    ctx.tokens.lock().unwrap().emit_outputs_filtered(&outcome.node_id, outcome.outputs.clone(), outcome.epoch, &suppress);

    events.publish(
        &ctx.execution_id,
        Event::NodeCompleted { execution_id: ctx.execution_id.clone(), node: outcome.node_id.clone() },
    );

    matches!(outcome.failed, Some((ref tag, _)) if tag == "fatal")
}

fn collect_endpoint_outputs(ctx: &ExecutionContext) -> HashMap<String, Envelope> {
    let mut out = HashMap::new();
    for endpoint in ctx.diagram.endpoints() {
        if let Some(snapshot) = ctx.state.snapshot(&endpoint.id) {
            if let Some(env) = snapshot.last_output {
                out.insert(endpoint.id.to_string(), env);
            }
        }
    }
    debug!(count = out.len(), "collected endpoint outputs");
    out
}
