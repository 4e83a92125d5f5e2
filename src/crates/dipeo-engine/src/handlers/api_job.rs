//! API_JOB / INTEGRATED_API handler (§4.6): an HTTP invoker.

use super::{error_envelope, retry_transient, Handler, HandlerServices};
use crate::diagram::Node;
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_services::http::HttpMethod;
use dipeo_support::async_utils::retry::RetryPolicy;
use dipeo_tokens::Envelope;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub struct ApiJobHandler;

#[async_trait]
impl Handler for ApiJobHandler {
    async fn run(
        &self,
        node: &Node,
        inputs: &ResolvedInputs,
        services: &HandlerServices,
    ) -> HashMap<String, Envelope> {
        let Some(http) = &services.http else {
            return error_envelope(node, "missing_service", "no HTTP client configured");
        };
        let Some(url) = node.config.get("url").and_then(Value::as_str) else {
            return error_envelope(node, "validation_fail", "api_job requires config.url");
        };
        let method = match node.config.get("method").and_then(Value::as_str).unwrap_or("GET") {
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            _ => HttpMethod::Get,
        };
        let timeout = Duration::from_secs(
            node.timeout_seconds.unwrap_or_else(|| {
                node.config.get("timeout_seconds").and_then(Value::as_u64).unwrap_or(30)
            }),
        );
        let body = inputs.get("body").map(|v| v.value());
        let headers = HashMap::new();

        let retry_policy = RetryPolicy::default();
        match retry_transient(&retry_policy, || {
            http.request(method, url, &headers, body.as_ref(), None, timeout)
        })
        .await
        {
            Ok(response) => {
                let mut out = HashMap::new();
                out.insert(
                    "default".to_string(),
                    Envelope::object(response.body, node.id.clone())
                        .with_meta("status", response.status as i64),
                );
                out
            }
            Err(e) if e.to_string().contains("timed out") => {
                error_envelope(node, "timeout", e.to_string())
            }
            Err(e) => error_envelope(node, "provider_error", e.to_string()),
        }
    }
}
