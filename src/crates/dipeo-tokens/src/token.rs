//! Per-edge token queues, join/concurrency policies, and epoch tracking
//! (§2 "TokenManager", §4.2).
//!
//! Grounded on the teacher's `Channel::update` batching in
//! `langgraph-checkpoint/src/channels.rs` and the deterministic write
//! application / version bump in `langgraph-core/src/pregel/algo.rs`: a
//! back-edge write here bumps the epoch the same way a Pregel write bumps
//! a channel version.

use crate::envelope::Envelope;
use crate::error::{Result, TokenError};
use crate::ids::{EdgeId, NodeId};
use std::collections::{HashMap, HashSet, VecDeque};

/// Readiness predicate over a node's inbound edges (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// At least one unconsumed token on every inbound edge for this epoch.
    All,
    /// At least one unconsumed token on any inbound edge.
    Any,
    /// At least `k` distinct inbound edges have a token.
    KOfN(usize),
}

impl Default for JoinPolicy {
    fn default() -> Self {
        JoinPolicy::All
    }
}

/// Policy limiting simultaneous executions of a node (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    Singleton,
    PerToken,
    Bounded(usize),
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        ConcurrencyPolicy::Singleton
    }
}

/// A single envelope delivery event on an edge at a given epoch (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub edge: EdgeId,
    pub epoch: i64,
    pub seq: u64,
    pub envelope: Envelope,
}

/// One inbound edge of a node, as cached by the manager (§4.2 "per node, a
/// cache of inbound edge map").
#[derive(Debug, Clone)]
pub struct InboundEdge {
    pub edge: EdgeId,
    pub target_handle: String,
}

/// One outbound edge of a node.
#[derive(Debug, Clone)]
pub struct OutboundEdge {
    pub source_handle: String,
    pub edge: EdgeId,
}

/// The static edge topology the manager needs, built once by the engine
/// from the [`ExecutableDiagram`](../dipeo_engine/struct.ExecutableDiagram.html)
/// and handed to [`TokenManager::new`]. Kept separate from the full
/// diagram so this crate never depends on the engine's node/edge types.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub inbound: HashMap<NodeId, Vec<InboundEdge>>,
    pub outbound: HashMap<NodeId, Vec<OutboundEdge>>,
    pub edge_target: HashMap<EdgeId, NodeId>,
    pub back_edges: HashSet<EdgeId>,
}

/// Per-edge token queues, join/concurrency policy evaluation, and epoch
/// tracking for one execution (§4.2).
pub struct TokenManager {
    topology: Topology,
    queues: HashMap<(EdgeId, i64), VecDeque<Token>>,
    next_seq: HashMap<EdgeId, u64>,
    current_epoch: i64,
    branch_decisions: HashMap<(NodeId, i64), bool>,
}

impl TokenManager {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            queues: HashMap::new(),
            next_seq: HashMap::new(),
            current_epoch: 0,
            branch_decisions: HashMap::new(),
        }
    }

    pub fn current_epoch(&self) -> i64 {
        self.current_epoch
    }

    /// Open a new epoch (§4.1 "Loop re-entry"). Returns the new epoch.
    pub fn begin_epoch(&mut self) -> i64 {
        self.current_epoch += 1;
        self.current_epoch
    }

    /// Record which branch handle a CONDITION node activated (§4.2).
    pub fn record_branch_decision(&mut self, node: &NodeId, epoch: i64, branch: bool) {
        self.branch_decisions.insert((node.clone(), epoch), branch);
    }

    pub fn branch_decision(&self, node: &NodeId, epoch: i64) -> Option<bool> {
        self.branch_decisions.get(&(node.clone(), epoch)).copied()
    }

    /// Push one token per outgoing edge carrying an activated output handle.
    /// Back-edges are tagged with `epoch + 1` (§4.1).
    pub fn emit_outputs(
        &mut self,
        node: &NodeId,
        outputs: HashMap<String, Envelope>,
        epoch: i64,
    ) {
        self.emit_outputs_filtered(node, outputs, epoch, &HashSet::new());
    }

    /// Same as [`emit_outputs`](Self::emit_outputs), but edges whose id is in
    /// `suppress` receive no token — used to implement "downstream nodes
    /// that don't declare `handles_errors` get no token" without leaking
    /// per-node config into this crate.
    pub fn emit_outputs_filtered(
        &mut self,
        node: &NodeId,
        outputs: HashMap<String, Envelope>,
        epoch: i64,
        suppress: &HashSet<EdgeId>,
    ) {
        let Some(outbound) = self.topology.outbound.get(node).cloned() else {
            return;
        };
        for out in outbound {
            if suppress.contains(&out.edge) {
                continue;
            }
            let Some(envelope) = outputs.get(&out.source_handle) else {
                continue;
            };
            let target_epoch = if self.topology.back_edges.contains(&out.edge) {
                epoch + 1
            } else {
                epoch
            };
            let seq = self.next_seq.entry(out.edge.clone()).or_insert(0);
            let token = Token {
                edge: out.edge.clone(),
                epoch: target_epoch,
                seq: *seq,
                envelope: envelope.clone(),
            };
            *seq += 1;
            self.queues
                .entry((out.edge.clone(), target_epoch))
                .or_default()
                .push_back(token);
        }
    }

    fn queue_len(&self, edge: &EdgeId, epoch: i64) -> usize {
        self.queues
            .get(&(edge.clone(), epoch))
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Readiness check at the current epoch, without consuming anything.
    pub fn has_new_inputs(&self, node: &NodeId, join: JoinPolicy) -> bool {
        let Some(inbound) = self.topology.inbound.get(node) else {
            return false;
        };
        if inbound.is_empty() {
            // A node with no inbound edges (e.g. START) is "ready" exactly
            // once, driven externally; TokenManager has no opinion here.
            return false;
        }
        let occupied = inbound
            .iter()
            .filter(|e| self.queue_len(&e.edge, self.current_epoch) > 0)
            .count();
        match join {
            JoinPolicy::All => occupied == inbound.len(),
            JoinPolicy::Any => occupied >= 1,
            JoinPolicy::KOfN(k) => occupied >= k,
        }
    }

    /// Smallest `seq` among the tokens currently at the head of this
    /// node's inbound queues at the current epoch — used by the scheduler
    /// as the "edge-input-age" tie-break (§4.1 step 3). Zero if the node
    /// has no queued inbound tokens.
    pub fn oldest_seq(&self, node: &NodeId) -> u64 {
        let Some(inbound) = self.topology.inbound.get(node) else {
            return 0;
        };
        inbound
            .iter()
            .filter_map(|e| {
                self.queues
                    .get(&(e.edge.clone(), self.current_epoch))
                    .and_then(|q| q.front())
                    .map(|t| t.seq)
            })
            .min()
            .unwrap_or(0)
    }

    /// Whether any token is queued strictly after the current epoch —
    /// i.e. a back-edge emission is waiting for the scheduler to open the
    /// next loop iteration via [`begin_epoch`](Self::begin_epoch).
    pub fn has_pending_epoch(&self) -> bool {
        self.queues
            .iter()
            .any(|((_, epoch), q)| *epoch > self.current_epoch && !q.is_empty())
    }

    /// Pop one token per satisfied inbound edge under `join`, at the
    /// current epoch. When multiple edges target the same input handle,
    /// later edges (by declaration order in `Topology::inbound`) override
    /// (§4.2 "Ordering guarantee"). No-op (returns an empty map) iff
    /// [`has_new_inputs`] is false (§8 invariant 5).
    pub fn consume_inbound(
        &mut self,
        node: &NodeId,
        join: JoinPolicy,
    ) -> Result<HashMap<String, Envelope>> {
        if !self.has_new_inputs(node, join) {
            return Ok(HashMap::new());
        }
        let inbound = self
            .topology
            .inbound
            .get(node)
            .ok_or_else(|| TokenError::UnknownEdge(node.to_string()))?
            .clone();
        let epoch = self.current_epoch;
        let mut result = HashMap::new();
        for e in &inbound {
            if let Some(queue) = self.queues.get_mut(&(e.edge.clone(), epoch)) {
                if let Some(tok) = queue.pop_front() {
                    // later edges win ties on the same handle: insertion
                    // order of `inbound` is declaration order, so a plain
                    // overwrite gives the correct "last wins" semantics.
                    result.insert(e.target_handle.clone(), tok.envelope);
                }
            }
        }
        Ok(result)
    }
}
