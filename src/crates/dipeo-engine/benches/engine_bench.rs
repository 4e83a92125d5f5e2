use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dipeo_engine::api::{Engine, ExecutionOptions};
use dipeo_engine::diagram::{start_id, Edge, EdgeTransform, ExecutableDiagram, Node, NodeKind};
use dipeo_engine::handlers::{HandlerRegistry, HandlerServices};
use dipeo_tokens::{EdgeId, ExecutionId, NodeId};

fn linear_diagram(steps: usize) -> ExecutableDiagram {
    let mut d = ExecutableDiagram::new(start_id());
    d.add_node(Node::new("START", NodeKind::Start));
    let mut prev = NodeId::from("START");
    for i in 0..steps {
        let id = format!("step{i}");
        d.add_node(Node::new(id.clone(), NodeKind::CodeJob).with_config(serde_json::json!({"op": "identity"})));
        d.add_edge(Edge {
            id: EdgeId::from(format!("e{i}")),
            source_node: prev.clone(),
            source_handle: "default".into(),
            target_node: NodeId::from(id.clone()),
            target_handle: "default".into(),
            transform: EdgeTransform::default(),
        });
        prev = NodeId::from(id);
    }
    d.add_node(Node::new("end", NodeKind::Endpoint));
    d.add_edge(Edge {
        id: EdgeId::from("e_end"),
        source_node: prev,
        source_handle: "default".into(),
        target_node: NodeId::from("end"),
        target_handle: "default".into(),
        transform: EdgeTransform::default(),
    });
    d
}

fn linear_pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("linear pipeline, 20 code_job steps", |b| {
        b.to_async(&runtime).iter(|| async {
            let engine = Engine::new(HandlerRegistry::with_defaults(), HandlerServices::default());
            let id = engine
                .start(ExecutionId::from("bench"), black_box(linear_diagram(20)), ExecutionOptions::default())
                .unwrap();
            engine.wait(&id).await.unwrap();
        });
    });
}

criterion_group!(benches, linear_pipeline_benchmark);
criterion_main!(benches);
