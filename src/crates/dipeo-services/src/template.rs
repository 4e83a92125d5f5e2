//! Template renderer trait used by handlers that interpolate runtime
//! variables into text bodies (§6).

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

pub enum TemplateRef<'a> {
    Id(&'a str),
    Content(&'a str),
}

#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(&self, template: TemplateRef<'_>, context: &Value) -> Result<String>;
}
