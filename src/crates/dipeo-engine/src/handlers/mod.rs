//! Handler registry (§4.6, §2 item 7): maps node types to stateless
//! handler implementations. Handlers are pure over `(config, inputs,
//! services)` and never raise across the scheduler boundary — a
//! recoverable failure becomes an error envelope on the default output.

mod api_job;
mod code_job;
mod codegen;
mod collect;
mod condition;
mod db;
mod endpoint;
mod person_job;
mod sub_diagram;

use crate::diagram::{Node, NodeKind};
use crate::resolver::ResolvedInputs;
use async_trait::async_trait;
use dipeo_services::ast::AstParser;
use dipeo_services::blob::BlobStore;
use dipeo_services::http::HttpClient;
use dipeo_services::ir::IrBuilderRegistry;
use dipeo_services::llm::LlmInvoker;
use dipeo_services::memory::MemorySelector;
use dipeo_services::schema::SchemaValidator;
use dipeo_services::secret::SecretStore;
use dipeo_services::subdiagram::SubDiagramExecutor;
use dipeo_services::template::TemplateRenderer;
use dipeo_support::async_utils::retry::{is_retryable_error, RetryPolicy};
use dipeo_tokens::Envelope;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// External collaborators a handler may need (§6). Every field is
/// optional: a handler that doesn't need a given service gets `None`
/// and returns an error envelope instead of panicking.
#[derive(Clone, Default)]
pub struct HandlerServices {
    pub llm: Option<Arc<dyn LlmInvoker>>,
    pub memory: Option<Arc<dyn MemorySelector>>,
    pub blob: Option<Arc<dyn BlobStore>>,
    pub http: Option<Arc<dyn HttpClient>>,
    pub secrets: Option<Arc<dyn SecretStore>>,
    pub ast: Option<Arc<dyn AstParser>>,
    pub ir: Option<Arc<dyn IrBuilderRegistry>>,
    pub template: Option<Arc<dyn TemplateRenderer>>,
    pub schema: Option<Arc<dyn SchemaValidator>>,
    pub sub_diagram: Option<Arc<dyn SubDiagramExecutor>>,
}

#[async_trait]
pub trait Handler: Send + Sync {
    /// Handlers must treat `inputs` as read-only and produce exactly
    /// one envelope per output handle they intend to activate.
    async fn run(
        &self,
        node: &Node,
        inputs: &ResolvedInputs,
        services: &HandlerServices,
    ) -> HashMap<String, Envelope>;
}

pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn with_defaults() -> Self {
        let mut handlers: HashMap<&'static str, Arc<dyn Handler>> = HashMap::new();
        handlers.insert(NodeKind::Endpoint.label(), Arc::new(endpoint::EndpointHandler));
        handlers.insert(NodeKind::PersonJob.label(), Arc::new(person_job::PersonJobHandler));
        handlers.insert(NodeKind::Condition.label(), Arc::new(condition::ConditionHandler));
        handlers.insert(NodeKind::CodeJob.label(), Arc::new(code_job::CodeJobHandler));
        handlers.insert(NodeKind::ApiJob.label(), Arc::new(api_job::ApiJobHandler));
        handlers.insert(NodeKind::IntegratedApi.label(), Arc::new(api_job::ApiJobHandler));
        handlers.insert(NodeKind::Db.label(), Arc::new(db::DbHandler));
        handlers.insert(NodeKind::SubDiagram.label(), Arc::new(sub_diagram::SubDiagramHandler));
        handlers.insert(NodeKind::Collect.label(), Arc::new(collect::CollectHandler));
        handlers.insert(NodeKind::TemplateJob.label(), Arc::new(codegen::TemplateJobHandler));
        handlers.insert(
            NodeKind::JsonSchemaValidator.label(),
            Arc::new(codegen::JsonSchemaValidatorHandler),
        );
        handlers.insert(NodeKind::TypescriptAst.label(), Arc::new(codegen::TypescriptAstHandler));
        handlers.insert(NodeKind::IrBuilder.label(), Arc::new(codegen::IrBuilderHandler));
        Self { handlers }
    }

    pub fn get(&self, kind: &NodeKind) -> Option<Arc<dyn Handler>> {
        self.handlers.get(kind.label()).cloned()
    }

    pub fn register(&mut self, label: &'static str, handler: Arc<dyn Handler>) {
        self.handlers.insert(label, handler);
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Shared helper: build a single-output error envelope (§7 "handlers
/// never raise... they return error envelopes").
pub(crate) fn error_envelope(node: &Node, tag: &str, message: impl Into<String>) -> HashMap<String, Envelope> {
    let mut out = HashMap::new();
    out.insert(
        "default".to_string(),
        Envelope::error(tag, message, node.id.clone()),
    );
    out
}

/// Retries a provider call under `policy`, backing off between attempts,
/// but only while the failure looks transient (`is_retryable_error`) — a
/// validation or not-found error returns on the first attempt instead of
/// being retried three times for no reason.
pub(crate) async fn retry_transient<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !is_retryable_error(&error.to_string()) || !policy.should_retry(attempt + 1) {
                    return Err(error);
                }
                tokio::time::sleep(policy.calculate_delay(attempt)).await;
                attempt += 1;
            }
        }
    }
}
