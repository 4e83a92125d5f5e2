//! Per-node execution status and output cache (§4.3), UI/history only —
//! never consulted for scheduling readiness.
//!
//! Grounded on the teacher's `store.rs` `Arc<RwLock<HashMap<...>>>` shape:
//! writes are serialized by a single lock, reads are lock-free snapshots.

use chrono::{DateTime, Utc};
use dipeo_tokens::{Envelope, NodeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    MaxIterReached,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct NodeState {
    pub status: NodeStatus,
    pub execution_count: u32,
    pub last_output: Option<Envelope>,
    pub last_error: Option<(String, String)>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Epoch this NodeState last transitioned in; re-entering PENDING is
    /// only legal in a later epoch (§4.3).
    epoch: i64,
}

impl NodeState {
    fn pending(epoch: i64) -> Self {
        Self {
            status: NodeStatus::Pending,
            execution_count: 0,
            last_output: None,
            last_error: None,
            started_at: None,
            ended_at: None,
            epoch,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub first_failed_node: Option<NodeId>,
    pub first_error: Option<String>,
}

/// Thread-safe NodeId → NodeState map plus execution-level aggregates
/// (§4.3). Transitions are monotonic per (node, epoch): PENDING → RUNNING
/// → {COMPLETED | FAILED | MAXITER_REACHED}; a node may re-enter PENDING
/// only in a later epoch (§8 invariant 3).
pub struct StateTracker {
    states: Arc<RwLock<HashMap<NodeId, NodeState>>>,
    summary: Arc<RwLock<ExecutionSummary>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            summary: Arc::new(RwLock::new(ExecutionSummary::default())),
        }
    }

    fn get_or_init(states: &mut HashMap<NodeId, NodeState>, node: &NodeId, epoch: i64) -> () {
        states.entry(node.clone()).or_insert_with(|| NodeState::pending(epoch));
    }

    /// `execution_count` accumulates across epochs — it is what
    /// `max_iteration` caps (§4.1), not a per-epoch counter. Only
    /// `status`/`epoch` reset on re-entry into a later epoch.
    pub fn transition_to_running(&self, node: &NodeId, epoch: i64) {
        let mut states = self.states.write().unwrap();
        Self::get_or_init(&mut states, node, epoch);
        let entry = states.get_mut(node).unwrap();
        entry.epoch = epoch;
        entry.status = NodeStatus::Running;
        entry.execution_count += 1;
        entry.started_at = Some(Utc::now());
    }

    pub fn transition_to_completed(&self, node: &NodeId, output: Envelope) {
        let mut states = self.states.write().unwrap();
        if let Some(entry) = states.get_mut(node) {
            entry.status = NodeStatus::Completed;
            entry.last_output = Some(output);
            entry.ended_at = Some(Utc::now());
        }
        self.summary.write().unwrap().completed += 1;
    }

    pub fn transition_to_failed(&self, node: &NodeId, tag: impl Into<String>, message: impl Into<String>) {
        let tag = tag.into();
        let message = message.into();
        {
            let mut states = self.states.write().unwrap();
            if let Some(entry) = states.get_mut(node) {
                entry.status = NodeStatus::Failed;
                entry.last_error = Some((tag.clone(), message.clone()));
                entry.ended_at = Some(Utc::now());
            }
        }
        let mut summary = self.summary.write().unwrap();
        summary.failed += 1;
        if summary.first_failed_node.is_none() {
            summary.first_failed_node = Some(node.clone());
            summary.first_error = Some(message);
        }
    }

    pub fn transition_to_max_iter(&self, node: &NodeId) {
        let mut states = self.states.write().unwrap();
        if let Some(entry) = states.get_mut(node) {
            entry.status = NodeStatus::MaxIterReached;
            entry.ended_at = Some(Utc::now());
        }
    }

    pub fn transition_to_skipped(&self, node: &NodeId, epoch: i64) {
        let mut states = self.states.write().unwrap();
        Self::get_or_init(&mut states, node, epoch);
        let entry = states.get_mut(node).unwrap();
        entry.status = NodeStatus::Skipped;
        self.summary.write().unwrap().skipped += 1;
    }

    pub fn snapshot(&self, node: &NodeId) -> Option<NodeState> {
        self.states.read().unwrap().get(node).cloned()
    }

    pub fn all_snapshots(&self) -> HashMap<NodeId, NodeState> {
        self.states.read().unwrap().clone()
    }

    pub fn summary(&self) -> ExecutionSummary {
        self.summary.read().unwrap().clone()
    }

    pub fn is_running(&self, node: &NodeId) -> bool {
        self.states
            .read()
            .unwrap()
            .get(node)
            .map(|s| s.status == NodeStatus::Running)
            .unwrap_or(false)
    }

    pub fn any_running(&self) -> bool {
        self.states
            .read()
            .unwrap()
            .values()
            .any(|s| s.status == NodeStatus::Running)
    }

    pub fn execution_count(&self, node: &NodeId) -> u32 {
        self.states
            .read()
            .unwrap()
            .get(node)
            .map(|s| s.execution_count)
            .unwrap_or(0)
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
