//! ENDPOINT handler (§3, §4.6): a sink node. It has nothing to compute —
//! it just hands back whatever arrived on `default` so the scheduler's
//! endpoint-output collection has something to snapshot.

use super::{Handler, HandlerServices};
use crate::diagram::Node;
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_tokens::Envelope;
use std::collections::HashMap;

pub struct EndpointHandler;

#[async_trait]
impl Handler for EndpointHandler {
    async fn run(
        &self,
        node: &Node,
        inputs: &ResolvedInputs,
        _services: &HandlerServices,
    ) -> HashMap<String, Envelope> {
        let envelope = match inputs.get("default") {
            Some(resolved) => resolved
                .as_envelope()
                .cloned()
                .unwrap_or_else(|| Envelope::object(resolved.value(), node.id.clone())),
            None => Envelope::object(serde_json::Value::Null, node.id.clone()),
        };
        HashMap::from([("default".to_string(), envelope)])
    }
}
