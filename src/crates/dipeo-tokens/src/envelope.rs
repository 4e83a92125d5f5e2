//! Immutable typed message carrier (§3 "Envelope").
//!
//! Every `with_*` operation returns a distinct [`Envelope`]; the receiver
//! is left byte-identical (§8 invariant 6). Conversation-state bodies
//! (`ContentType::ConversationState`) model the same role/content shape as
//! the teacher's `messages::Message`, generalized from a single reducer
//! channel into a standalone envelope body variant.

use crate::error::{Result, TokenError};
use crate::ids::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Speaker role of a conversation message, mirrored from the teacher's
/// `MessageRole` but narrowed to what PERSON_JOB needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Human,
    Assistant,
    Tool,
}

/// A single turn of conversation state, carried inside a
/// `ContentType::ConversationState` envelope body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub id: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Tag identifying which view of [`EnvelopeBody`] is valid (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    RawText,
    Object,
    Binary,
    ConversationState,
}

impl ContentType {
    fn label(self) -> &'static str {
        match self {
            ContentType::RawText => "RAW_TEXT",
            ContentType::Object => "OBJECT",
            ContentType::Binary => "BINARY",
            ContentType::ConversationState => "CONVERSATION_STATE",
        }
    }
}

/// The payload carried by an [`Envelope`], one variant per [`ContentType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EnvelopeBody {
    Text(String),
    Object(serde_json::Value),
    Binary(Vec<u8>),
    Conversation(Vec<Message>),
}

/// A scalar value storable in [`Envelope::meta`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}
impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}
impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}
impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

/// Immutable message carrier passed along edges (§3).
///
/// All mutating-looking methods (`with_meta`, `with_iteration`, ...) take
/// `self` by value and return a new `Envelope`; none mutate in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    body: EnvelopeBody,
    content_type: ContentType,
    pub produced_by: NodeId,
    pub error: Option<String>,
    meta: BTreeMap<String, MetaValue>,
}

impl Envelope {
    fn new(body: EnvelopeBody, content_type: ContentType, produced_by: NodeId) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert(
            "created_at".to_string(),
            MetaValue::Text(chrono::Utc::now().to_rfc3339()),
        );
        Self {
            body,
            content_type,
            produced_by,
            error: None,
            meta,
        }
    }

    pub fn text(body: impl Into<String>, produced_by: NodeId) -> Self {
        Self::new(EnvelopeBody::Text(body.into()), ContentType::RawText, produced_by)
    }

    pub fn object(body: serde_json::Value, produced_by: NodeId) -> Self {
        Self::new(EnvelopeBody::Object(body), ContentType::Object, produced_by)
    }

    pub fn binary(body: Vec<u8>, produced_by: NodeId) -> Self {
        Self::new(EnvelopeBody::Binary(body), ContentType::Binary, produced_by)
    }

    pub fn conversation(body: Vec<Message>, produced_by: NodeId) -> Self {
        Self::new(
            EnvelopeBody::Conversation(body),
            ContentType::ConversationState,
            produced_by,
        )
    }

    /// Build an error envelope: a RAW_TEXT envelope tagged with `error`
    /// (§7: "handlers never raise... they return error envelopes").
    pub fn error(tag: impl Into<String>, message: impl Into<String>, produced_by: NodeId) -> Self {
        let mut env = Self::text(message, produced_by);
        env.error = Some(tag.into());
        env
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn meta(&self) -> &BTreeMap<String, MetaValue> {
        &self.meta
    }

    /// Return a new envelope with `key` set in `meta` (original untouched).
    pub fn with_meta(&self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        let mut next = self.clone();
        next.meta.insert(key.into(), value.into());
        next
    }

    /// Convenience wrapper over `with_meta("iteration", i)`.
    pub fn with_iteration(&self, i: i64) -> Self {
        self.with_meta("iteration", i)
    }

    pub fn with_epoch(&self, epoch: i64) -> Self {
        self.with_meta("epoch", epoch)
    }

    pub fn with_branch(&self, branch: bool) -> Self {
        self.with_meta("branch", branch)
    }

    /// View the body as text. Fails with `ContentTypeMismatch` unless
    /// `content_type == RAW_TEXT`.
    pub fn as_text(&self) -> Result<&str> {
        match &self.body {
            EnvelopeBody::Text(s) => Ok(s),
            _ => Err(TokenError::ContentTypeMismatch {
                expected: "RAW_TEXT",
                actual: self.content_type.label(),
            }),
        }
    }

    /// View the body as structured JSON. Fails unless `content_type == OBJECT`.
    pub fn as_json(&self) -> Result<&serde_json::Value> {
        match &self.body {
            EnvelopeBody::Object(v) => Ok(v),
            _ => Err(TokenError::ContentTypeMismatch {
                expected: "OBJECT",
                actual: self.content_type.label(),
            }),
        }
    }

    pub fn as_binary(&self) -> Result<&[u8]> {
        match &self.body {
            EnvelopeBody::Binary(b) => Ok(b),
            _ => Err(TokenError::ContentTypeMismatch {
                expected: "BINARY",
                actual: self.content_type.label(),
            }),
        }
    }

    pub fn as_conversation(&self) -> Result<&[Message]> {
        match &self.body {
            EnvelopeBody::Conversation(m) => Ok(m),
            _ => Err(TokenError::ContentTypeMismatch {
                expected: "CONVERSATION_STATE",
                actual: self.content_type.label(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nid() -> NodeId {
        NodeId::from("n1")
    }

    #[test]
    fn text_round_trips() {
        let env = Envelope::text("hi", nid());
        assert_eq!(env.as_text().unwrap(), "hi");
    }

    #[test]
    fn object_round_trips() {
        let body = serde_json::json!({"a": 1});
        let env = Envelope::object(body.clone(), nid());
        assert_eq!(env.as_json().unwrap(), &body);
    }

    #[test]
    fn accessor_mismatch_is_an_error() {
        let env = Envelope::text("hi", nid());
        assert!(env.as_json().is_err());
        assert!(env.as_binary().is_err());
        assert!(env.as_conversation().is_err());
    }

    #[test]
    fn with_meta_does_not_mutate_original() {
        let original = Envelope::text("hi", nid());
        let tagged = original.with_iteration(3);
        assert!(!original.meta().contains_key("iteration"));
        assert_eq!(tagged.meta().get("iteration"), Some(&MetaValue::Int(3)));
        // original is otherwise byte-identical
        assert_eq!(original.as_text().unwrap(), tagged.as_text().unwrap());
    }

    #[test]
    fn error_envelope_signals_failure() {
        let env = Envelope::error("timeout", "request timed out", nid());
        assert!(env.has_error());
        assert_eq!(env.error.as_deref(), Some("timeout"));
    }
}
