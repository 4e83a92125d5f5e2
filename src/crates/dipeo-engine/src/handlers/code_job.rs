//! CODE_JOB handler (§4.6): a sandboxed code runner. Concrete process/
//! subprocess execution is out of scope (§1 "Concrete LLM provider
//! SDKs, HTTP clients, file-system adapters..." generalizes to "no
//! arbitrary host execution" here too); the sandbox this core actually
//! offers is the safe arithmetic evaluator in `crate::expr`, driven by
//! a node-declared `op`.

use super::{error_envelope, Handler, HandlerServices};
use crate::diagram::Node;
use crate::expr;
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_tokens::Envelope;
use serde_json::Value;
use std::collections::HashMap;

pub struct CodeJobHandler;

#[async_trait]
impl Handler for CodeJobHandler {
    async fn run(
        &self,
        node: &Node,
        inputs: &ResolvedInputs,
        _services: &HandlerServices,
    ) -> HashMap<String, Envelope> {
        let mut context = serde_json::Map::new();
        for (handle, value) in inputs {
            context.insert(handle.clone(), value.value());
        }
        let context = Value::Object(context);

        let op = node.config.get("op").and_then(Value::as_str).unwrap_or("identity");
        let result = match op {
            "identity" => context.clone(),
            "accumulate" => {
                let field = node.config.get("counter_field").and_then(Value::as_str).unwrap_or("i");
                let current = context.get(field).and_then(Value::as_i64).unwrap_or(0);
                let mut next = context.as_object().cloned().unwrap_or_default();
                next.insert(field.to_string(), Value::from(current + 1));
                Value::Object(next)
            }
            "eval" => {
                let Some(expr_src) = node.config.get("expr").and_then(Value::as_str) else {
                    return error_envelope(node, "validation_fail", "code_job op=eval requires config.expr");
                };
                Value::from(expr::eval_num(expr_src, &context))
            }
            other => return error_envelope(node, "validation_fail", format!("unknown code_job op '{other}'")),
        };

        let mut out = HashMap::new();
        out.insert("default".to_string(), Envelope::object(result, node.id.clone()));
        out
    }
}
