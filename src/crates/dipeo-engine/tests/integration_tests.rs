//! End-to-end scenarios driving a whole diagram through `Engine` rather
//! than unit-testing individual modules: a linear pipeline, a condition
//! branch, a bounded loop, a join, error suppression across
//! `handles_errors`, and a sub-diagram batch.

use async_trait::async_trait;
use dipeo_engine::rules::Transform;
use dipeo_engine::{
    Edge, EdgeTransform, Engine, ExecutableDiagram, ExecutionOptions, ExecutionStatus, HandlerRegistry,
    HandlerServices, Node, NodeKind,
};
use dipeo_services::http::{HttpAuth, HttpClient, HttpMethod, HttpResponse};
use dipeo_tokens::{ConcurrencyPolicy, EdgeId, ExecutionId, JoinPolicy, NodeId, BRANCH_FALSE, BRANCH_TRUE};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn edge(id: &str, src: &str, src_handle: &str, dst: &str, dst_handle: &str) -> Edge {
    Edge {
        id: EdgeId::from(id),
        source_node: NodeId::from(src),
        source_handle: src_handle.to_string(),
        target_node: NodeId::from(dst),
        target_handle: dst_handle.to_string(),
        transform: EdgeTransform::default(),
    }
}

/// An edge that also projects `field` out of the upstream's object body
/// before handing it to the target — without this, a multi-hop value
/// arrives still wrapped under its producing handle's name.
fn select_edge(id: &str, src: &str, src_handle: &str, dst: &str, dst_handle: &str, field: &str) -> Edge {
    Edge {
        transform: EdgeTransform { rules: vec![Transform::SelectField(field.to_string())] },
        ..edge(id, src, src_handle, dst, dst_handle)
    }
}

fn engine() -> Engine {
    Engine::new(HandlerRegistry::with_defaults(), HandlerServices::default())
}

// S1: a linear three-node pipeline runs start-to-finish.
#[tokio::test]
async fn s1_linear_pipeline_completes() {
    let mut d = ExecutableDiagram::new(NodeId::from("start"));
    d.add_node(Node::new("start", NodeKind::Start));
    d.add_node(
        Node::new("double", NodeKind::CodeJob)
            .with_config(json!({"op": "eval", "expr": "x*2"}))
            .with_inputs(["x"]),
    );
    d.add_node(Node::new("end", NodeKind::Endpoint));
    d.add_edge(select_edge("e1", "start", "default", "double", "x", "x"));
    d.add_edge(edge("e2", "double", "default", "end", "default"));

    let engine = engine();
    let id = engine
        .start(
            ExecutionId::from("s1"),
            d,
            ExecutionOptions { strict_mode: false, inputs: HashMap::from([("x".to_string(), json!(5))]) },
        )
        .unwrap();
    let result = engine.wait(&id).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.outputs["end"].as_json().unwrap(), &json!(10.0));
}

// S2: a condition activates exactly one branch; the other node never runs.
#[tokio::test]
async fn s2_condition_activates_single_branch() {
    let mut d = ExecutableDiagram::new(NodeId::from("start"));
    d.add_node(Node::new("start", NodeKind::Start));
    d.add_node(
        Node::new("cond", NodeKind::Condition)
            .with_config(json!({"expression": "x > 3"}))
            .with_inputs(["x"]),
    );
    d.add_node(Node::new("hot", NodeKind::Endpoint));
    d.add_node(Node::new("cold", NodeKind::Endpoint));
    d.add_edge(select_edge("e1", "start", "default", "cond", "x", "x"));
    d.add_edge(Edge {
        id: EdgeId::from("e_true"),
        source_node: NodeId::from("cond"),
        source_handle: BRANCH_TRUE.to_string(),
        target_node: NodeId::from("hot"),
        target_handle: "default".into(),
        transform: EdgeTransform::default(),
    });
    d.add_edge(Edge {
        id: EdgeId::from("e_false"),
        source_node: NodeId::from("cond"),
        source_handle: BRANCH_FALSE.to_string(),
        target_node: NodeId::from("cold"),
        target_handle: "default".into(),
        transform: EdgeTransform::default(),
    });

    let engine = engine();
    let id = engine
        .start(
            ExecutionId::from("s2"),
            d,
            ExecutionOptions { strict_mode: false, inputs: HashMap::from([("x".to_string(), json!(5))]) },
        )
        .unwrap();
    let result = engine.wait(&id).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(result.outputs.contains_key("hot"));
    assert!(!result.outputs.contains_key("cold"));

    let snapshot = engine.state(&id).unwrap();
    assert!(!snapshot.node_states.contains_key(&NodeId::from("cold")));
}

// S3: a back-edge loop runs until its condition flips, not forever.
#[tokio::test]
async fn s3_loop_terminates_when_condition_flips() {
    let mut d = ExecutableDiagram::new(NodeId::from("start"));
    d.add_node(Node::new("start", NodeKind::Start));
    d.add_node(
        Node::new("counter", NodeKind::CodeJob)
            .with_config(json!({"op": "accumulate", "counter_field": "i"}))
            .with_inputs(["i"])
            .with_join_policy(JoinPolicy::Any)
            .with_max_iteration(10),
    );
    d.add_node(
        Node::new("cond", NodeKind::Condition)
            .with_config(json!({"expression": "i < 3"}))
            .with_inputs(["i"]),
    );
    d.add_node(Node::new("end", NodeKind::Endpoint));
    d.add_edge(edge("e1", "start", "default", "counter", "i"));
    d.add_edge(select_edge("e2", "counter", "default", "cond", "i", "i"));
    d.add_edge(Edge {
        transform: EdgeTransform { rules: vec![Transform::SelectField("i".to_string())] },
        ..Edge {
            id: EdgeId::from("e_back"),
            source_node: NodeId::from("cond"),
            source_handle: BRANCH_TRUE.to_string(),
            target_node: NodeId::from("counter"),
            target_handle: "i".into(),
            transform: EdgeTransform::default(),
        }
    });
    d.add_edge(Edge {
        id: EdgeId::from("e_exit"),
        source_node: NodeId::from("cond"),
        source_handle: BRANCH_FALSE.to_string(),
        target_node: NodeId::from("end"),
        target_handle: "default".into(),
        transform: EdgeTransform::default(),
    });

    let engine = engine();
    let id = engine.start(ExecutionId::from("s3"), d, ExecutionOptions::default()).unwrap();
    let result = engine.wait(&id).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.outputs["end"].as_json().unwrap()["i"], json!(3));

    let snapshot = engine.state(&id).unwrap();
    assert_eq!(snapshot.node_states[&NodeId::from("counter")].execution_count, 3);
}

// S4: a join=All node waits for tokens from both of its inbound edges
// before it runs, and only runs once for the round both arrive in.
#[tokio::test]
async fn s4_join_all_waits_for_both_inputs() {
    let mut d = ExecutableDiagram::new(NodeId::from("start"));
    d.add_node(Node::new("start", NodeKind::Start));
    d.add_node(Node::new("left", NodeKind::CodeJob).with_config(json!({"op": "identity"})));
    d.add_node(Node::new("right", NodeKind::CodeJob).with_config(json!({"op": "identity"})));
    d.add_node(
        Node::new("join", NodeKind::CodeJob)
            .with_config(json!({"op": "identity"}))
            .with_inputs(["a", "b"])
            .with_join_policy(JoinPolicy::All),
    );
    d.add_node(Node::new("end", NodeKind::Endpoint));
    d.add_edge(edge("e1", "start", "default", "left", "default"));
    d.add_edge(edge("e2", "start", "default", "right", "default"));
    d.add_edge(edge("e3", "left", "default", "join", "a"));
    d.add_edge(edge("e4", "right", "default", "join", "b"));
    d.add_edge(edge("e5", "join", "default", "end", "default"));

    let engine = engine();
    let id = engine.start(ExecutionId::from("s4"), d, ExecutionOptions::default()).unwrap();
    let result = engine.wait(&id).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);

    let snapshot = engine.state(&id).unwrap();
    assert_eq!(snapshot.node_states[&NodeId::from("join")].execution_count, 1);
}

struct FailingHttpClient;

#[async_trait]
impl HttpClient for FailingHttpClient {
    async fn request(
        &self,
        _method: HttpMethod,
        _url: &str,
        _headers: &HashMap<String, String>,
        _body: Option<&serde_json::Value>,
        _auth: Option<&HttpAuth>,
        _timeout: Duration,
    ) -> dipeo_services::Result<HttpResponse> {
        Err(dipeo_services::ServiceError::Provider("upstream exploded".into()))
    }
}

// S5: a node's error envelope only reaches a downstream node that
// declares `handles_errors`; the execution as a whole still reports
// Failed since the originating node itself failed.
#[tokio::test]
async fn s5_error_envelope_only_reaches_handler() {
    let mut d = ExecutableDiagram::new(NodeId::from("start"));
    d.add_node(Node::new("start", NodeKind::Start));
    d.add_node(Node::new("call", NodeKind::ApiJob).with_config(json!({"url": "https://example.invalid"})));
    d.add_node(Node::new("recover", NodeKind::Endpoint).handling_errors());
    d.add_node(Node::new("normal", NodeKind::CodeJob).with_config(json!({"op": "identity"})));
    d.add_node(Node::new("normal_end", NodeKind::Endpoint));
    d.add_edge(edge("e1", "start", "default", "call", "default"));
    d.add_edge(edge("e2", "call", "default", "recover", "default"));
    d.add_edge(edge("e3", "call", "default", "normal", "default"));
    d.add_edge(edge("e4", "normal", "default", "normal_end", "default"));

    let engine = Engine::new(
        HandlerRegistry::with_defaults(),
        HandlerServices { http: Some(Arc::new(FailingHttpClient)), ..Default::default() },
    );
    let id = engine.start(ExecutionId::from("s5"), d, ExecutionOptions::default()).unwrap();
    let result = engine.wait(&id).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.outputs["recover"].has_error());
    assert!(!result.outputs.contains_key("normal_end"));

    let snapshot = engine.state(&id).unwrap();
    assert!(!snapshot.node_states.contains_key(&NodeId::from("normal")));
}

// S6: SUB_DIAGRAM batch dispatches one sub-execution per item and
// aggregates outputs in input order.
#[tokio::test]
async fn s6_sub_diagram_batch_aggregates_in_order() {
    let mut inner = ExecutableDiagram::new(NodeId::from("start"));
    inner.add_node(Node::new("start", NodeKind::Start));
    inner.add_node(
        Node::new("double", NodeKind::CodeJob)
            .with_config(json!({"op": "eval", "expr": "item*2"}))
            .with_inputs(["item"]),
    );
    inner.add_node(Node::new("default", NodeKind::Endpoint));
    inner.add_edge(select_edge("e1", "start", "default", "double", "item", "default"));
    inner.add_edge(edge("e2", "double", "default", "default", "default"));

    let engine = Arc::new(engine());
    let sub_executor = Arc::new(dipeo_engine::EngineSubDiagramExecutor::new(engine.clone()));
    sub_executor.register("double_diagram", inner);

    let mut outer = ExecutableDiagram::new(NodeId::from("start"));
    outer.add_node(Node::new("start", NodeKind::Start));
    outer.add_node(
        Node::new("batch", NodeKind::SubDiagram)
            .with_config(json!({"diagram_ref": "double_diagram", "batch": true, "batch_input_key": "items"}))
            .with_inputs(["items"])
            .with_concurrency_policy(ConcurrencyPolicy::PerToken),
    );
    outer.add_node(Node::new("end", NodeKind::Endpoint));
    outer.add_edge(select_edge("e1", "start", "default", "batch", "items", "items"));
    outer.add_edge(edge("e2", "batch", "default", "end", "default"));

    let outer_engine = Engine::new(
        HandlerRegistry::with_defaults(),
        HandlerServices { sub_diagram: Some(sub_executor), ..Default::default() },
    );
    let id = outer_engine
        .start(
            ExecutionId::from("s6"),
            outer,
            ExecutionOptions { strict_mode: false, inputs: HashMap::from([("items".to_string(), json!([1, 2, 3]))]) },
        )
        .unwrap();
    let result = outer_engine.wait(&id).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.outputs["end"].as_json().unwrap(), &json!([2.0, 4.0, 6.0]));
}
