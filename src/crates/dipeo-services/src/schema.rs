//! Schema validator trait (§6), used by InputResolver in strict mode
//! (§4.4) and by handlers validating structured LLM output.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait SchemaValidator: Send + Sync {
    /// Unlike the other traits here this never raises `ServiceError`:
    /// a schema mismatch is reported via `ValidationOutcome`, not a
    /// transport failure.
    async fn validate(&self, data: &Value, schema: &Value, strict: bool) -> ValidationOutcome;
}
