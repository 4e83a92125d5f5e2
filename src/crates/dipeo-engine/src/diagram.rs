//! Diagram data model (§3): the read-only graph the scheduler drives.
//!
//! Grounded on the teacher's `graph.rs` node/edge registration, narrowed
//! from a builder API accepting closures to a flat, data-only structure —
//! diagram compilation from source formats is out of scope (§1), so
//! `ExecutableDiagram` is constructed directly or via `ExecutableDiagram::new`
//! and then validated once.

use crate::error::{ExecutionError, Result};
use dipeo_tokens::{ConcurrencyPolicy, EdgeId, JoinPolicy, NodeId, BRANCH_FALSE, BRANCH_TRUE, ENDPOINT_NODE, START_NODE};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Node type tag (§4.6). Handlers are looked up by this tag in the
/// `HandlerRegistry`; config is a typed record per kind per §9, modeled
/// here as a JSON value since the concrete schema per kind lives outside
/// this crate's scope.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Start,
    Endpoint,
    PersonJob,
    Condition,
    CodeJob,
    ApiJob,
    IntegratedApi,
    Db,
    SubDiagram,
    Collect,
    TemplateJob,
    JsonSchemaValidator,
    TypescriptAst,
    IrBuilder,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Start => "START",
            NodeKind::Endpoint => "ENDPOINT",
            NodeKind::PersonJob => "PERSON_JOB",
            NodeKind::Condition => "CONDITION",
            NodeKind::CodeJob => "CODE_JOB",
            NodeKind::ApiJob => "API_JOB",
            NodeKind::IntegratedApi => "INTEGRATED_API",
            NodeKind::Db => "DB",
            NodeKind::SubDiagram => "SUB_DIAGRAM",
            NodeKind::Collect => "COLLECT",
            NodeKind::TemplateJob => "TEMPLATE_JOB",
            NodeKind::JsonSchemaValidator => "JSON_SCHEMA_VALIDATOR",
            NodeKind::TypescriptAst => "TYPESCRIPT_AST",
            NodeKind::IrBuilder => "IR_BUILDER",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub config: Value,
    pub input_handles: Vec<String>,
    pub output_handles: Vec<String>,
    pub max_iteration: Option<u32>,
    /// `None` means the node declares no explicit policy and falls back
    /// to the engine's `default_bounded_concurrency` (§5, §ambient config).
    pub concurrency_policy: Option<ConcurrencyPolicy>,
    pub join_policy: JoinPolicy,
    pub expose_index_as: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub handles_errors: bool,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        let default_outputs = if kind == NodeKind::Condition {
            vec![BRANCH_TRUE.to_string(), BRANCH_FALSE.to_string()]
        } else {
            vec!["default".to_string()]
        };
        Self {
            id: id.into(),
            kind,
            config: Value::Null,
            input_handles: vec!["default".to_string()],
            output_handles: default_outputs,
            max_iteration: None,
            concurrency_policy: None,
            join_policy: JoinPolicy::default(),
            expose_index_as: None,
            timeout_seconds: None,
            handles_errors: false,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_inputs(mut self, handles: impl IntoIterator<Item = &'static str>) -> Self {
        self.input_handles = handles.into_iter().map(String::from).collect();
        self
    }

    pub fn with_outputs(mut self, handles: impl IntoIterator<Item = &'static str>) -> Self {
        self.output_handles = handles.into_iter().map(String::from).collect();
        self
    }

    pub fn with_max_iteration(mut self, n: u32) -> Self {
        self.max_iteration = Some(n);
        self
    }

    pub fn with_join_policy(mut self, policy: JoinPolicy) -> Self {
        self.join_policy = policy;
        self
    }

    pub fn with_concurrency_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency_policy = Some(policy);
        self
    }

    pub fn with_expose_index_as(mut self, name: impl Into<String>) -> Self {
        self.expose_index_as = Some(name.into());
        self
    }

    pub fn handling_errors(mut self) -> Self {
        self.handles_errors = true;
        self
    }
}

impl PartialEq for NodeKind {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
impl Eq for NodeKind {}
impl std::hash::Hash for NodeKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state)
    }
}

/// Edge-level transform rule override (§4.4, merged over type-based rules).
#[derive(Debug, Clone, Default)]
pub struct EdgeTransform {
    pub rules: Vec<crate::rules::Transform>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub source_node: NodeId,
    pub source_handle: String,
    pub target_node: NodeId,
    pub target_handle: String,
    pub transform: EdgeTransform,
}

/// The read-only graph driven by the scheduler (§3). Owned by the
/// scheduler for the lifetime of an execution; never mutated.
#[derive(Debug, Clone)]
pub struct ExecutableDiagram {
    pub nodes: HashMap<NodeId, Node>,
    pub edges: Vec<Edge>,
    pub start: NodeId,
}

impl ExecutableDiagram {
    pub fn new(start: NodeId) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            start,
        }
    }

    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Structural validation (§3 invariant, §7 `DiagramStructural`):
    /// every edge endpoint references a declared handle; START has no
    /// inbound edges; ENDPOINT has no outbound edges; no edge targets
    /// START.
    pub fn validate(&self) -> Result<()> {
        for edge in &self.edges {
            let source = self.nodes.get(&edge.source_node).ok_or_else(|| {
                ExecutionError::DiagramStructural(format!(
                    "edge {} references unknown source node {}",
                    edge.id, edge.source_node
                ))
            })?;
            let target = self.nodes.get(&edge.target_node).ok_or_else(|| {
                ExecutionError::DiagramStructural(format!(
                    "edge {} references unknown target node {}",
                    edge.id, edge.target_node
                ))
            })?;
            if !source.output_handles.contains(&edge.source_handle) {
                return Err(ExecutionError::DiagramStructural(format!(
                    "edge {} references undeclared output handle '{}' on node {}",
                    edge.id, edge.source_handle, edge.source_node
                )));
            }
            if !target.input_handles.contains(&edge.target_handle) {
                return Err(ExecutionError::DiagramStructural(format!(
                    "edge {} references undeclared input handle '{}' on node {}",
                    edge.id, edge.target_handle, edge.target_node
                )));
            }
            if edge.target_node == self.start {
                return Err(ExecutionError::DiagramStructural(format!(
                    "edge {} targets START node {}",
                    edge.id, self.start
                )));
            }
            if source.kind == NodeKind::Endpoint {
                return Err(ExecutionError::DiagramStructural(format!(
                    "edge {} originates from an ENDPOINT node {}",
                    edge.id, edge.source_node
                )));
            }
            if !crate::rules::can_connect(&source.kind, &target.kind) {
                return Err(ExecutionError::DiagramStructural(format!(
                    "edge {} connects {:?} -> {:?}, which is not allowed",
                    edge.id, source.kind, target.kind
                )));
            }
        }
        Ok(())
    }

    /// Topological level of every node reachable from `start`, computed
    /// by BFS shortest-path distance. Unreachable nodes get level 0. A
    /// node's level is fixed the first time it is discovered and never
    /// revisited, so a cycle can't inflate it round after round — that
    /// is what makes the levels usable to classify back-edges (§4.1,
    /// §9 "Cyclic diagram graph").
    pub fn topo_levels(&self) -> HashMap<NodeId, u32> {
        let mut outbound: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in &self.edges {
            outbound.entry(&edge.source_node).or_default().push(&edge.target_node);
        }

        let mut levels: HashMap<NodeId, u32> = HashMap::new();
        levels.insert(self.start.clone(), 0);
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(self.start.clone());
        while let Some(node) = queue.pop_front() {
            let level = levels[&node];
            let Some(targets) = outbound.get(&node) else { continue };
            for target in targets {
                if !levels.contains_key(*target) {
                    levels.insert((*target).clone(), level + 1);
                    queue.push_back((*target).clone());
                }
            }
        }
        levels
    }

    /// An edge is a back-edge if its target's level is ≤ its source's
    /// level (§4.1, §GLOSSARY). Levels are computed via forward
    /// relaxation, so a genuine loop edge never gets to tighten its own
    /// source and is correctly detected here.
    pub fn classify_back_edges(&self) -> HashSet<EdgeId> {
        let levels = self.topo_levels();
        let mut back = HashSet::new();
        for edge in &self.edges {
            let src = levels.get(&edge.source_node).copied().unwrap_or(0);
            let tgt = levels.get(&edge.target_node).copied().unwrap_or(0);
            if tgt <= src {
                back.insert(edge.id.clone());
            }
        }
        back
    }

    pub fn build_topology(&self) -> dipeo_tokens::Topology {
        let mut topo = dipeo_tokens::Topology::default();
        topo.back_edges = self.classify_back_edges();
        for edge in &self.edges {
            topo.outbound
                .entry(edge.source_node.clone())
                .or_default()
                .push(dipeo_tokens::OutboundEdge {
                    source_handle: edge.source_handle.clone(),
                    edge: edge.id.clone(),
                });
            topo.inbound
                .entry(edge.target_node.clone())
                .or_default()
                .push(dipeo_tokens::InboundEdge {
                    edge: edge.id.clone(),
                    target_handle: edge.target_handle.clone(),
                });
            topo.edge_target.insert(edge.id.clone(), edge.target_node.clone());
        }
        topo
    }

    pub fn endpoints(&self) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.kind == NodeKind::Endpoint)
            .collect()
    }
}

pub fn start_id() -> NodeId {
    NodeId::from(START_NODE)
}

pub fn endpoint_id() -> NodeId {
    NodeId::from(ENDPOINT_NODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_diagram() -> ExecutableDiagram {
        let mut d = ExecutableDiagram::new(NodeId::from("start"));
        d.add_node(Node::new("start", NodeKind::Start));
        d.add_node(Node::new("p1", NodeKind::PersonJob));
        d.add_node(Node::new("end", NodeKind::Endpoint));
        d.add_edge(Edge {
            id: EdgeId::from("e1"),
            source_node: NodeId::from("start"),
            source_handle: "default".into(),
            target_node: NodeId::from("p1"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        d.add_edge(Edge {
            id: EdgeId::from("e2"),
            source_node: NodeId::from("p1"),
            source_handle: "default".into(),
            target_node: NodeId::from("end"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        d
    }

    #[test]
    fn valid_linear_diagram_passes_validation() {
        assert!(linear_diagram().validate().is_ok());
    }

    #[test]
    fn edge_into_start_is_rejected() {
        let mut d = linear_diagram();
        d.add_edge(Edge {
            id: EdgeId::from("bad"),
            source_node: NodeId::from("p1"),
            source_handle: "default".into(),
            target_node: NodeId::from("start"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        assert!(d.validate().is_err());
    }

    #[test]
    fn undeclared_handle_is_rejected() {
        let mut d = linear_diagram();
        d.add_edge(Edge {
            id: EdgeId::from("bad"),
            source_node: NodeId::from("p1"),
            source_handle: "nope".into(),
            target_node: NodeId::from("end"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        assert!(d.validate().is_err());
    }

    #[test]
    fn loop_back_edge_is_classified() {
        let mut d = ExecutableDiagram::new(NodeId::from("start"));
        d.add_node(Node::new("start", NodeKind::Start));
        d.add_node(Node::new("code", NodeKind::CodeJob));
        d.add_node(Node::new("cond", NodeKind::Condition));
        d.add_node(Node::new("end", NodeKind::Endpoint));
        d.add_edge(Edge {
            id: EdgeId::from("e1"),
            source_node: NodeId::from("start"),
            source_handle: "default".into(),
            target_node: NodeId::from("code"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        d.add_edge(Edge {
            id: EdgeId::from("e2"),
            source_node: NodeId::from("code"),
            source_handle: "default".into(),
            target_node: NodeId::from("cond"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        d.add_edge(Edge {
            id: EdgeId::from("e_back"),
            source_node: NodeId::from("cond"),
            source_handle: BRANCH_TRUE.into(),
            target_node: NodeId::from("code"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        d.add_edge(Edge {
            id: EdgeId::from("e_exit"),
            source_node: NodeId::from("cond"),
            source_handle: BRANCH_FALSE.into(),
            target_node: NodeId::from("end"),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        let back = d.classify_back_edges();
        assert!(back.contains(&EdgeId::from("e_back")));
        assert!(!back.contains(&EdgeId::from("e1")));
        assert!(!back.contains(&EdgeId::from("e_exit")));
    }
}
