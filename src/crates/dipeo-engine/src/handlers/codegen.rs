//! Codegen-oriented handlers (§4.6): TEMPLATE_JOB, JSON_SCHEMA_VALIDATOR,
//! TYPESCRIPT_AST, and IR_BUILDER, each a thin wrapper over its matching
//! §6 service.

use super::{error_envelope, retry_transient, Handler, HandlerServices};
use crate::diagram::Node;
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_services::template::TemplateRef;
use dipeo_support::async_utils::retry::RetryPolicy;
use dipeo_tokens::Envelope;
use serde_json::Value;
use std::collections::HashMap;

pub struct TemplateJobHandler;

#[async_trait]
impl Handler for TemplateJobHandler {
    async fn run(&self, node: &Node, inputs: &ResolvedInputs, services: &HandlerServices) -> HashMap<String, Envelope> {
        let Some(renderer) = &services.template else {
            return error_envelope(node, "missing_service", "no template renderer configured");
        };
        let mut context = serde_json::Map::new();
        for (handle, value) in inputs {
            context.insert(handle.clone(), value.value());
        }
        let context = Value::Object(context);

        let id = node.config.get("template_id").and_then(Value::as_str);
        let content = node.config.get("template_content").and_then(Value::as_str);
        if id.is_none() && content.is_none() {
            return error_envelope(node, "validation_fail", "template_job requires template_id or template_content");
        }

        let retry_policy = RetryPolicy::default();
        match retry_transient(&retry_policy, || {
            let template_ref = match id {
                Some(id) => TemplateRef::Id(id),
                None => TemplateRef::Content(content.unwrap()),
            };
            renderer.render(template_ref, &context)
        })
        .await
        {
            Ok(text) => {
                let mut out = HashMap::new();
                out.insert("default".to_string(), Envelope::text(text, node.id.clone()));
                out
            }
            Err(e) => error_envelope(node, "provider_error", e.to_string()),
        }
    }
}

pub struct JsonSchemaValidatorHandler;

#[async_trait]
impl Handler for JsonSchemaValidatorHandler {
    async fn run(&self, node: &Node, inputs: &ResolvedInputs, services: &HandlerServices) -> HashMap<String, Envelope> {
        let Some(validator) = &services.schema else {
            return error_envelope(node, "missing_service", "no schema validator configured");
        };
        let Some(schema) = node.config.get("schema") else {
            return error_envelope(node, "validation_fail", "json_schema_validator requires config.schema");
        };
        let data = inputs.get("default").map(|v| v.value()).unwrap_or(Value::Null);
        let strict = node.config.get("strict").and_then(Value::as_bool).unwrap_or(false);

        let outcome = validator.validate(&data, schema, strict).await;
        let mut out = HashMap::new();
        if outcome.ok {
            out.insert("default".to_string(), Envelope::object(data, node.id.clone()));
        } else {
            out.insert(
                "default".to_string(),
                Envelope::error("validation_fail", outcome.errors.join("; "), node.id.clone()),
            );
        }
        out
    }
}

pub struct TypescriptAstHandler;

#[async_trait]
impl Handler for TypescriptAstHandler {
    async fn run(&self, node: &Node, inputs: &ResolvedInputs, services: &HandlerServices) -> HashMap<String, Envelope> {
        let Some(parser) = &services.ast else {
            return error_envelope(node, "missing_service", "no AST parser configured");
        };
        let Some(source) = inputs.get("default").and_then(|v| v.as_envelope()).and_then(|e| e.as_text().ok())
        else {
            return error_envelope(node, "validation_fail", "typescript_ast requires RAW_TEXT 'default' input");
        };
        let patterns: Vec<String> = node
            .config
            .get("patterns")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let retry_policy = RetryPolicy::default();
        match retry_transient(&retry_policy, || {
            parser.parse(source, "typescript", &patterns, node.config.get("options").unwrap_or(&Value::Null))
        })
        .await
        {
            Ok(ast) => {
                let mut out = HashMap::new();
                out.insert(
                    "default".to_string(),
                    Envelope::object(serde_json::to_value(ast).unwrap_or(Value::Null), node.id.clone()),
                );
                out
            }
            Err(e) => error_envelope(node, "provider_error", e.to_string()),
        }
    }
}

pub struct IrBuilderHandler;

#[async_trait]
impl Handler for IrBuilderHandler {
    async fn run(&self, node: &Node, inputs: &ResolvedInputs, services: &HandlerServices) -> HashMap<String, Envelope> {
        let Some(registry) = &services.ir else {
            return error_envelope(node, "missing_service", "no IR builder registry configured");
        };
        let Some(kind) = node.config.get("kind").and_then(Value::as_str) else {
            return error_envelope(node, "validation_fail", "ir_builder requires config.kind");
        };
        let ast_value = inputs.get("default").map(|v| v.value()).unwrap_or(Value::Null);
        let ast_data: dipeo_services::ast::AstData = serde_json::from_value(ast_value).unwrap_or_default();

        let retry_policy = RetryPolicy::default();
        match retry_transient(&retry_policy, || {
            registry.build(kind, &ast_data, node.config.get("options").unwrap_or(&Value::Null))
        })
        .await
        {
            Ok(ir) => {
                let mut out = HashMap::new();
                out.insert("default".to_string(), Envelope::object(ir, node.id.clone()));
                out
            }
            Err(e) => error_envelope(node, "provider_error", e.to_string()),
        }
    }
}
