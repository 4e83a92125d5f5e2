//! LLM invoker trait consumed by the PERSON_JOB handler (§6, §4.6).
//!
//! Mirrors the teacher's `ChatModel`: the core is an orchestration
//! framework, not an LLM client. It defines the shape of an invocation
//! and leaves the provider (OpenAI, Anthropic, a local model) to the
//! caller. One method rather than the teacher's chat/stream pair,
//! since streaming deltas are out of scope here (§1 Non-goals).

use crate::error::Result;
use async_trait::async_trait;
use dipeo_tokens::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// JSON schema the response must conform to, if structured output is requested.
    pub structured_output_schema: Option<Value>,
    pub tools_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub name: String,
    pub arguments: Value,
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<Usage>,
    pub tool_outputs: Vec<ToolOutput>,
}

/// Either a single prompt or a full conversation history (§6).
#[derive(Debug, Clone)]
pub enum LlmInput {
    Prompt(String),
    Messages(Vec<Message>),
}

/// Credentials handed to the invoker by the caller; never logged
/// (§6 Secret/key store) and not inspected by the core itself.
#[derive(Clone)]
pub struct LlmCredentials(HashMap<String, String>);

impl LlmCredentials {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl Default for LlmCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LlmCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCredentials")
            .field("keys", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Implemented by callers for their chosen provider; PERSON_JOB holds
/// an `Arc<dyn LlmInvoker>` and never knows which provider it is.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    async fn invoke(
        &self,
        input: LlmInput,
        model_id: &str,
        options: &LlmOptions,
        credentials: &LlmCredentials,
    ) -> Result<LlmResponse>;

    /// Default implementation assumes availability; local-model
    /// implementations (Ollama-style) should override with a health check.
    async fn is_available(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Deterministic test double: echoes the prompt/last message back as
/// the response text. Used by handler unit tests and integration tests.
#[derive(Debug, Clone, Default)]
pub struct EchoLlm;

#[async_trait]
impl LlmInvoker for EchoLlm {
    async fn invoke(
        &self,
        input: LlmInput,
        _model_id: &str,
        _options: &LlmOptions,
        _credentials: &LlmCredentials,
    ) -> Result<LlmResponse> {
        let text = match input {
            LlmInput::Prompt(p) => p,
            LlmInput::Messages(msgs) => msgs
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
        };
        Ok(LlmResponse {
            text,
            usage: Some(Usage {
                input_tokens: 1,
                output_tokens: 1,
                total_tokens: 2,
            }),
            tool_outputs: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_llm_returns_prompt() {
        let llm = EchoLlm;
        let resp = llm
            .invoke(
                LlmInput::Prompt("hello".into()),
                "mock-model",
                &LlmOptions::default(),
                &LlmCredentials::new(),
            )
            .await
            .unwrap();
        assert_eq!(resp.text, "hello");
    }

    #[tokio::test]
    async fn echo_llm_echoes_last_message() {
        let llm = EchoLlm;
        let msgs = vec![
            Message::new(dipeo_tokens::MessageRole::Human, "first"),
            Message::new(dipeo_tokens::MessageRole::Human, "second"),
        ];
        let resp = llm
            .invoke(
                LlmInput::Messages(msgs),
                "mock-model",
                &LlmOptions::default(),
                &LlmCredentials::new(),
            )
            .await
            .unwrap();
        assert_eq!(resp.text, "second");
    }
}
