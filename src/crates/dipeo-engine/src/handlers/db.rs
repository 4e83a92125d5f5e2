//! DB handler (§4.6): a file-system/storage operation over `BlobStore`.

use super::{error_envelope, Handler, HandlerServices};
use crate::diagram::Node;
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_tokens::Envelope;
use serde_json::Value;
use std::collections::HashMap;

pub struct DbHandler;

#[async_trait]
impl Handler for DbHandler {
    async fn run(
        &self,
        node: &Node,
        inputs: &ResolvedInputs,
        services: &HandlerServices,
    ) -> HashMap<String, Envelope> {
        let Some(blob) = &services.blob else {
            return error_envelope(node, "missing_service", "no blob store configured");
        };
        let Some(key) = node.config.get("key").and_then(Value::as_str) else {
            return error_envelope(node, "validation_fail", "db node requires config.key");
        };
        let operation = node.config.get("operation").and_then(Value::as_str).unwrap_or("read");

        match operation {
            "read" => match blob.get(key, None).await {
                Ok(bytes) => {
                    let mut out = HashMap::new();
                    out.insert("default".to_string(), Envelope::binary(bytes, node.id.clone()));
                    out
                }
                Err(e) => error_envelope(node, "provider_error", e.to_string()),
            },
            "write" => {
                let Some(input) = inputs.get("default") else {
                    return error_envelope(node, "validation_fail", "db write requires a 'default' input");
                };
                let bytes = serde_json::to_vec(&input.value()).unwrap_or_default();
                match blob.put(key, bytes).await {
                    Ok(version) => {
                        let mut out = HashMap::new();
                        out.insert(
                            "default".to_string(),
                            Envelope::text(version, node.id.clone()),
                        );
                        out
                    }
                    Err(e) => error_envelope(node, "provider_error", e.to_string()),
                }
            }
            other => error_envelope(node, "validation_fail", format!("unknown db operation '{other}'")),
        }
    }
}
