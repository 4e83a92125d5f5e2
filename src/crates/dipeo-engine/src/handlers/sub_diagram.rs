//! SUB_DIAGRAM handler (§4.6, §8 S6): a recursive execution invocation,
//! optionally batched. The core recursively uses itself via
//! `SubDiagramExecutor` to avoid a crate dependency cycle between
//! `dipeo-engine` and `dipeo-services`.

use super::{error_envelope, Handler, HandlerServices};
use crate::diagram::Node;
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_services::subdiagram::SubDiagramOptions;
use dipeo_tokens::Envelope;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub struct SubDiagramHandler;

#[async_trait]
impl Handler for SubDiagramHandler {
    async fn run(
        &self,
        node: &Node,
        inputs: &ResolvedInputs,
        services: &HandlerServices,
    ) -> HashMap<String, Envelope> {
        let Some(executor) = &services.sub_diagram else {
            return error_envelope(node, "missing_service", "no sub-diagram executor configured");
        };
        let Some(diagram_ref) = node.config.get("diagram_ref").and_then(Value::as_str) else {
            return error_envelope(node, "validation_fail", "sub_diagram requires config.diagram_ref");
        };

        let batch = node.config.get("batch").and_then(Value::as_bool).unwrap_or(false);
        if !batch {
            let mut sub_inputs = BTreeMap::new();
            for (handle, value) in inputs {
                if let Some(env) = value.as_envelope() {
                    sub_inputs.insert(handle.clone(), env.clone());
                } else {
                    sub_inputs.insert(handle.clone(), Envelope::object(value.value(), node.id.clone()));
                }
            }
            return match executor
                .execute(diagram_ref, sub_inputs, &SubDiagramOptions::default())
                .await
            {
                Ok(mut outputs) => outputs
                    .remove("default")
                    .map(|env| HashMap::from([("default".to_string(), env)]))
                    .unwrap_or_else(|| error_envelope(node, "provider_error", "sub-diagram produced no default output")),
                Err(e) => error_envelope(node, "provider_error", e.to_string()),
            };
        }

        // §8 S6: batch=true dispatches one sub-execution per item,
        // aggregating outputs in input order regardless of completion order.
        let batch_key = node
            .config
            .get("batch_input_key")
            .and_then(Value::as_str)
            .unwrap_or("items");
        let Some(items) = inputs.get(batch_key).map(|v| v.value()).and_then(|v| v.as_array().cloned())
        else {
            return error_envelope(node, "validation_fail", format!("missing batch input '{batch_key}'"));
        };

        let batch_options = SubDiagramOptions::default();
        let futures = items.into_iter().map(|item| {
            let mut sub_inputs = BTreeMap::new();
            sub_inputs.insert("default".to_string(), Envelope::object(item, node.id.clone()));
            executor.execute(diagram_ref, sub_inputs, &batch_options)
        });
        let results = futures::future::join_all(futures).await;

        let mut aggregated = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(mut outputs) => {
                    let value = outputs
                        .remove("default")
                        .map(|env| env.as_json().ok().cloned().unwrap_or(Value::Null))
                        .unwrap_or(Value::Null);
                    aggregated.push(value);
                }
                Err(e) => return error_envelope(node, "provider_error", e.to_string()),
            }
        }

        let mut out = HashMap::new();
        out.insert(
            "default".to_string(),
            Envelope::object(Value::Array(aggregated), node.id.clone()),
        );
        out
    }
}
