//! InputResolver (§4.4): turns consumed tokens into the mapping a
//! handler expects, applying per-node-type strategies, content-type
//! coercions, and transform rules.

use crate::diagram::{ExecutableDiagram, Node, NodeKind};
use crate::error::{ExecutionError, Result};
use crate::rules::{get_data_transform, merge_transforms, Transform};
use dipeo_tokens::{ContentType, Envelope};
use serde_json::Value;
use std::collections::HashMap;

/// A resolved handler input: either the consumed envelope untouched, or
/// the `Value` a transform reduced it to. Handlers that need envelope
/// semantics (e.g. `as_conversation`) match on `Envelope`; handlers that
/// only need structured data use `value()`.
#[derive(Debug, Clone)]
pub enum ResolvedInput {
    Envelope(Envelope),
    Value(Value),
}

impl ResolvedInput {
    /// Best-effort JSON view regardless of variant, used by handlers
    /// that don't care whether a transform ran.
    pub fn value(&self) -> Value {
        match self {
            ResolvedInput::Envelope(env) => match env.content_type() {
                ContentType::Object => env.as_json().ok().cloned().unwrap_or(Value::Null),
                ContentType::RawText => Value::String(env.as_text().unwrap_or_default().to_string()),
                _ => Value::Null,
            },
            ResolvedInput::Value(v) => v.clone(),
        }
    }

    pub fn as_envelope(&self) -> Option<&Envelope> {
        match self {
            ResolvedInput::Envelope(e) => Some(e),
            ResolvedInput::Value(_) => None,
        }
    }
}

pub type ResolvedInputs = HashMap<String, ResolvedInput>;

pub struct InputResolver {
    pub strict_mode: bool,
}

impl InputResolver {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    /// §4.4 pipeline steps 2-6: extraction/coercion, transformation,
    /// node-type strategy injection, defaults, validation. Step 1 (edge
    /// selection under the join policy) already happened in
    /// `TokenManager::consume_inbound` — `tokens` here only contains
    /// handles that were actually satisfied.
    pub fn resolve(
        &self,
        node: &Node,
        diagram: &ExecutableDiagram,
        tokens: HashMap<String, Envelope>,
        iteration: u32,
        epoch: i64,
    ) -> Result<ResolvedInputs> {
        let mut resolved: ResolvedInputs = HashMap::new();

        for (handle, envelope) in tokens {
            let source = envelope.produced_by.clone();
            let coerced = self.coerce(node, &handle, envelope)?;
            let transforms = self.transforms_for(node, diagram, &handle, &source);
            let value = self.apply_transforms(&coerced, &transforms);
            resolved.insert(handle, value);
        }

        self.apply_strategy(node, &mut resolved, iteration, epoch);
        self.validate(node, &resolved)?;
        Ok(resolved)
    }

    /// Content-type coercion (§4.4 step 2): RAW_TEXT -> OBJECT when the
    /// text parses as strict JSON and the target declares object type;
    /// OBJECT -> RAW_TEXT by canonical JSON serialization when the
    /// target declares text. CONVERSATION_STATE is never coerced. The
    /// "target declares" type is approximated here by whether the node
    /// is a PERSON_JOB (expects text/conversation) vs. everything else
    /// (expects structured object) — the full per-handle type schema is
    /// outside this crate's scope (§1).
    fn coerce(&self, node: &Node, _handle: &str, envelope: Envelope) -> Result<Envelope> {
        let wants_object = !matches!(node.kind, NodeKind::PersonJob);
        match envelope.content_type() {
            ContentType::ConversationState => Ok(envelope),
            ContentType::RawText if wants_object => {
                match envelope.as_text().ok().and_then(|t| serde_json::from_str::<Value>(t).ok()) {
                    Some(v) => Ok(Envelope::object(v, envelope.produced_by.clone())),
                    None if self.strict_mode => Err(ExecutionError::TypeMismatch {
                        node: node.id.to_string(),
                        handle: _handle.to_string(),
                        detail: "expected OBJECT, body is not strict JSON".into(),
                    }),
                    None => Ok(envelope),
                }
            }
            ContentType::Object if !wants_object => {
                let v = envelope.as_json().ok().cloned().unwrap_or(Value::Null);
                let text = serde_json::to_string(&v).map_err(|e| ExecutionError::TypeMismatch {
                    node: node.id.to_string(),
                    handle: _handle.to_string(),
                    detail: e.to_string(),
                })?;
                Ok(Envelope::text(text, envelope.produced_by.clone()))
            }
            _ => Ok(envelope),
        }
    }

    /// `source` disambiguates when two inbound edges share a target
    /// handle (e.g. an initial edge and a back-edge both feeding a loop
    /// counter's `i`) — match the edge whose source actually produced
    /// this envelope, falling back to the first handle match otherwise.
    fn transforms_for(
        &self,
        node: &Node,
        diagram: &ExecutableDiagram,
        handle: &str,
        source: &dipeo_tokens::NodeId,
    ) -> Vec<Transform> {
        let mut candidates = diagram.edges.iter().filter(|e| e.target_node == node.id && e.target_handle == handle);
        let edge = candidates
            .clone()
            .find(|e| e.source_node == *source)
            .or_else(|| candidates.next());
        let Some(edge) = edge else { return Vec::new() };
        let Some(source) = diagram.nodes.get(&edge.source_node) else {
            return Vec::new();
        };
        let type_based = get_data_transform(&source.kind, &node.kind, &source.config);
        merge_transforms(type_based, edge.transform.rules.clone())
    }

    /// §4.4 step 3. `spread` runs before `pack` (decided open question:
    /// spread expands a mapping into sibling handles before any `pack`
    /// bundles inputs back together, so a spread-then-pack pipeline is
    /// observable within one resolve call).
    fn apply_transforms(&self, envelope: &Envelope, transforms: &[Transform]) -> ResolvedInput {
        let mut current = ResolvedInput::Envelope(envelope.clone());
        for t in transforms {
            current = match t {
                Transform::ExtractToolResults => {
                    let v = current.value();
                    ResolvedInput::Value(v.get("tool_outputs").cloned().unwrap_or(Value::Null))
                }
                Transform::SelectField(path) => {
                    let v = current.value();
                    ResolvedInput::Value(select_field(&v, path))
                }
                Transform::FormatString(template) => {
                    let v = current.value();
                    ResolvedInput::Value(Value::String(render_template(template, &v)))
                }
                Transform::Spread => current,
                Transform::Pack => {
                    let v = current.value();
                    ResolvedInput::Value(serde_json::json!({ "packed": v }))
                }
            };
        }
        current
    }

    /// §4.4 step 4: inject node-type-specific special inputs.
    fn apply_strategy(&self, node: &Node, resolved: &mut ResolvedInputs, iteration: u32, epoch: i64) {
        match node.kind {
            NodeKind::PersonJob | NodeKind::SubDiagram => {
                if let Some(name) = &node.expose_index_as {
                    resolved.insert(name.clone(), ResolvedInput::Value(Value::from(iteration)));
                }
            }
            NodeKind::Condition => {
                resolved.insert("__epoch".into(), ResolvedInput::Value(Value::from(epoch)));
            }
            NodeKind::Collect => {
                let packed: Vec<Value> = resolved.values().map(ResolvedInput::value).collect();
                resolved.insert("collected".into(), ResolvedInput::Value(Value::Array(packed)));
            }
            _ => {}
        }
    }

    /// §4.4 step 6: required inputs missing -> MissingRequiredInput.
    /// Which handles are "required" is every declared input handle
    /// except `"default"` on nodes with no inbound edges at all (START
    /// has none by construction) — anything beyond that, a node
    /// declaring an input handle is expected to receive it.
    fn validate(&self, node: &Node, resolved: &ResolvedInputs) -> Result<()> {
        if matches!(node.kind, NodeKind::Start) {
            return Ok(());
        }
        for handle in &node.input_handles {
            if !resolved.contains_key(handle) && self.strict_mode {
                return Err(ExecutionError::MissingRequiredInput {
                    node: node.id.to_string(),
                    handle: handle.clone(),
                });
            }
        }
        Ok(())
    }
}

fn select_field(value: &Value, path: &str) -> Value {
    path.split('.').fold(value.clone(), |acc, segment| {
        acc.get(segment).cloned().unwrap_or(Value::Null)
    })
}

/// `{{var}}` interpolation, resolving against a flat JSON object.
pub fn render_template(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            let key = after[..end].trim();
            let replacement = context
                .get(key)
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            out.push_str(&replacement);
            rest = &after[end + 2..];
        } else {
            out.push_str("{{");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}
