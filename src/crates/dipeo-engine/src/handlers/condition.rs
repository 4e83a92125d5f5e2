//! CONDITION handler (§4.6): a pure evaluator for
//! `detect_max_iterations | nodes_executed | expression | llm_decision`.
//! Activates exactly one of `{true, false}` (§4.1) — the scheduler never
//! sees a token on the non-active branch because this handler simply
//! never emits one.

use super::{Handler, HandlerServices};
use crate::diagram::Node;
use crate::expr;
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_services::llm::{LlmCredentials, LlmInput, LlmOptions};
use dipeo_tokens::{Envelope, BRANCH_FALSE, BRANCH_TRUE};
use serde_json::Value;
use std::collections::HashMap;

pub struct ConditionHandler;

#[async_trait]
impl Handler for ConditionHandler {
    async fn run(
        &self,
        node: &Node,
        inputs: &ResolvedInputs,
        services: &HandlerServices,
    ) -> HashMap<String, Envelope> {
        let mut context = serde_json::Map::new();
        for (handle, value) in inputs {
            context.insert(handle.clone(), value.value());
        }
        let context = Value::Object(context);

        let mode = node
            .config
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or("expression");

        let decision = match mode {
            "detect_max_iterations" => {
                let execution_count = context
                    .get("execution_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let max = node.max_iteration.unwrap_or(u32::MAX) as u64;
                execution_count >= max
            }
            "nodes_executed" => {
                let target = node.config.get("node").and_then(Value::as_str).unwrap_or("");
                context
                    .get("executed_nodes")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().any(|v| v.as_str() == Some(target)))
                    .unwrap_or(false)
            }
            "llm_decision" => {
                let Some(llm) = &services.llm else {
                    return super::error_envelope(node, "missing_service", "no LLM invoker configured");
                };
                let prompt = node
                    .config
                    .get("prompt")
                    .and_then(Value::as_str)
                    .unwrap_or("Answer yes or no.");
                let rendered = crate::resolver::render_template(prompt, &context);
                match llm
                    .invoke(
                        LlmInput::Prompt(rendered),
                        "default",
                        &LlmOptions::default(),
                        &LlmCredentials::new(),
                    )
                    .await
                {
                    Ok(response) => response.text.trim().to_lowercase().starts_with("yes"),
                    Err(e) => return super::error_envelope(node, "provider_error", e.to_string()),
                }
            }
            _ => {
                let expression = node.config.get("expression").and_then(Value::as_str).unwrap_or("0");
                expr::eval_bool(expression, &context)
            }
        };

        let mut out = HashMap::new();
        let handle = if decision { BRANCH_TRUE } else { BRANCH_FALSE };
        out.insert(
            handle.to_string(),
            Envelope::object(context, node.id.clone()).with_branch(decision),
        );
        out
    }
}
