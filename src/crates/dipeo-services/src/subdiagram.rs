//! Sub-diagram executor trait (§6): the core recursively uses itself
//! to satisfy SUB_DIAGRAM nodes. This trait is the seam that avoids a
//! dependency cycle — `dipeo-engine` implements it over its own
//! `Engine`, this crate only names the shape.

use crate::error::Result;
use async_trait::async_trait;
use dipeo_tokens::Envelope;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct SubDiagramOptions {
    pub wait: bool,
    pub extra: Value,
}

#[async_trait]
pub trait SubDiagramExecutor: Send + Sync {
    async fn execute(
        &self,
        diagram_ref: &str,
        inputs: BTreeMap<String, Envelope>,
        options: &SubDiagramOptions,
    ) -> Result<BTreeMap<String, Envelope>>;
}
