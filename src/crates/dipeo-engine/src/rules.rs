//! Connection & transform rules (§4.5): pure functions, no I/O. Advisory
//! at runtime, authoritative at compile time — `ExecutableDiagram::validate`
//! calls `can_connect` for every edge before an execution ever starts.

use crate::diagram::NodeKind;
use serde_json::Value;

/// A recognized built-in transform (§4.4). Applied by the `InputResolver`
/// after content-type coercion and before node-type strategies run.
#[derive(Debug, Clone)]
pub enum Transform {
    ExtractToolResults,
    SelectField(String),
    FormatString(String),
    Spread,
    Pack,
}

pub fn can_connect(source: &NodeKind, target: &NodeKind) -> bool {
    if *target == NodeKind::Start {
        return false;
    }
    if *source == NodeKind::Endpoint {
        return false;
    }
    true
}

/// Type-based default transform for an edge between two node kinds
/// (§4.5 example: PERSON_JOB → CONDITION injects `extract_tool_results`
/// when the source has tools enabled).
pub fn get_data_transform(source: &NodeKind, target: &NodeKind, source_config: &Value) -> Vec<Transform> {
    let mut transforms = Vec::new();
    if *source == NodeKind::PersonJob
        && *target == NodeKind::Condition
        && source_config
            .get("tools_enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    {
        transforms.push(Transform::ExtractToolResults);
    }
    transforms
}

/// `DataTransformRules.merge_transforms` (§4.4): edge-level rules
/// override type-based rules by appending after them — a later,
/// more-specific transform of the same kind takes effect since
/// `apply_transforms` (in `resolver.rs`) applies transforms in order
/// and each is idempotent to re-application.
pub fn merge_transforms(type_based: Vec<Transform>, edge_level: Vec<Transform>) -> Vec<Transform> {
    let mut merged = type_based;
    merged.extend(edge_level);
    merged
}
