//! PERSON_JOB handler (§4.6): an LLM invoker plus a memory-selection
//! hook. Renders `prompt` against resolved inputs, invokes the LLM, and
//! emits its text as a RAW_TEXT envelope.

use super::{error_envelope, retry_transient, Handler, HandlerServices};
use crate::diagram::Node;
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_services::llm::{LlmCredentials, LlmInput, LlmOptions};
use dipeo_support::async_utils::retry::RetryPolicy;
use dipeo_tokens::Envelope;
use serde_json::Value;
use std::collections::HashMap;

pub struct PersonJobHandler;

#[async_trait]
impl Handler for PersonJobHandler {
    async fn run(
        &self,
        node: &Node,
        inputs: &ResolvedInputs,
        services: &HandlerServices,
    ) -> HashMap<String, Envelope> {
        let Some(llm) = &services.llm else {
            return error_envelope(node, "missing_service", "no LLM invoker configured");
        };

        let template = node
            .config
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or("{{default}}");
        let mut full_context = serde_json::Map::new();
        for (handle, value) in inputs {
            full_context.insert(handle.clone(), value.value());
        }

        // §4.6/§6: the selector picks which inbound handles count as
        // "in memory" for this call; candidates not selected are dropped
        // from the context before the final prompt is rendered, so an
        // unselective selector is indistinguishable from no selector.
        let candidates: Vec<String> = inputs.keys().cloned().collect();
        let selected = match &services.memory {
            Some(selector) => {
                let preview = crate::resolver::render_template(template, &Value::Object(full_context.clone()));
                let at_most = node
                    .config
                    .get("at_most")
                    .and_then(Value::as_u64)
                    .unwrap_or(candidates.len() as u64) as usize;
                selector
                    .select(
                        node.id.as_str(),
                        &candidates,
                        &preview,
                        node.config.get("memorize_to").unwrap_or(&Value::Null),
                        at_most,
                    )
                    .await
                    .unwrap_or_else(|_| candidates.clone())
            }
            None => candidates,
        };

        let context: serde_json::Map<String, Value> = full_context
            .into_iter()
            .filter(|(handle, _)| selected.contains(handle))
            .collect();
        let prompt = crate::resolver::render_template(template, &Value::Object(context));

        let model_id = node
            .config
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or("default");
        let options = LlmOptions {
            temperature: node.config.get("temperature").and_then(Value::as_f64).map(|f| f as f32),
            max_tokens: node.config.get("max_tokens").and_then(Value::as_u64).map(|n| n as u32),
            structured_output_schema: node.config.get("structured_output_schema").cloned(),
            tools_enabled: node
                .config
                .get("tools_enabled")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };

        let credentials = LlmCredentials::new();
        let retry_policy = RetryPolicy::default();
        match retry_transient(&retry_policy, || {
            llm.invoke(LlmInput::Prompt(prompt.clone()), model_id, &options, &credentials)
        })
        .await
        {
            Ok(response) => {
                let mut out = HashMap::new();
                out.insert("default".to_string(), Envelope::text(response.text, node.id.clone()));
                out
            }
            Err(e) => error_envelope(node, "provider_error", e.to_string()),
        }
    }
}
