//! AST parser trait, feeding CODE_JOB's introspection needs (§6).

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AstData {
    pub interfaces: Vec<Value>,
    pub types: Vec<Value>,
    pub enums: Vec<Value>,
    pub classes: Vec<Value>,
    pub functions: Vec<Value>,
    pub constants: Vec<Value>,
}

#[async_trait]
pub trait AstParser: Send + Sync {
    async fn parse(
        &self,
        source: &str,
        language: &str,
        patterns: &[String],
        options: &Value,
    ) -> Result<AstData>;
}
