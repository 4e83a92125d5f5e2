//! IR builder registry trait (§6): turns AST data into a build-kind-specific
//! intermediate representation, e.g. for code generation pipelines.

use crate::ast::AstData;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait IrBuilderRegistry: Send + Sync {
    async fn build(&self, kind: &str, ast_data: &AstData, options: &Value) -> Result<Value>;
}
