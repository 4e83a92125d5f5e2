//! COLLECT handler: a fan-in aggregator driven by the resolver's
//! `Collect` node-type strategy (§4.4), which already packs every
//! resolved input into a `"collected"` array — this handler just emits it.

use super::{Handler, HandlerServices};
use crate::diagram::Node;
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_tokens::Envelope;
use serde_json::Value;
use std::collections::HashMap;

pub struct CollectHandler;

#[async_trait]
impl Handler for CollectHandler {
    async fn run(
        &self,
        node: &Node,
        inputs: &ResolvedInputs,
        _services: &HandlerServices,
    ) -> HashMap<String, Envelope> {
        let collected = inputs
            .get("collected")
            .map(|v| v.value())
            .unwrap_or(Value::Array(Vec::new()));
        let mut out = HashMap::new();
        out.insert("default".to_string(), Envelope::object(collected, node.id.clone()));
        out
    }
}
