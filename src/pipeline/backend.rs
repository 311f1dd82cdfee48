//! The generative backend seam.
//!
//! [`AuditBackend`] is the black box `f(prompt, schema) → content`. The audit
//! client builds a [`BackendRequest`] and only ever talks to this trait, so
//! the transport can be swapped (OpenAI-compatible HTTP, any edgequake-llm
//! provider, a stub in tests) without touching validation or error mapping.

use crate::pipeline::assemble::{PromptPayload, Segment};
use crate::prompts::schema_instruction;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Everything one audit call sends to the backend.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub model: String,
    pub system_instruction: String,
    pub payload: PromptPayload,
    pub schema_name: String,
    /// JSON Schema the reply must satisfy.
    pub schema: Value,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Raw reply: the message content, if any, plus token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendReply {
    pub content: Option<String>,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Why a backend call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendFailure {
    /// The credential was rejected (HTTP 401/403).
    #[error("authentication rejected by '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// Non-success HTTP status.
    #[error("HTTP {status} from '{provider}': {detail}")]
    Http {
        provider: String,
        status: u16,
        detail: String,
    },

    /// Network, timeout or client-side failure.
    #[error("request to '{provider}' failed: {detail}")]
    Transport { provider: String, detail: String },

    /// The backend declined to answer (content filter, refusal).
    #[error("'{provider}' refused to answer: {detail}")]
    Refused { provider: String, detail: String },
}

impl BackendFailure {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendFailure::Auth { .. } | BackendFailure::Refused { .. } => false,
            BackendFailure::Http { status, .. } => *status == 429 || *status >= 500,
            BackendFailure::Transport { .. } => true,
        }
    }
}

/// A generative model that can answer an audit request.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    /// Short provider label for logs and errors.
    fn name(&self) -> &str;

    async fn generate(&self, request: &BackendRequest) -> Result<BackendReply, BackendFailure>;
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Runs the audit through any edgequake-llm provider.
///
/// Provider-agnostic chat has no strict schema hook, so the schema is
/// appended to the system instruction and enforced afterwards by
/// [`crate::schema::VerdictSchema`]. Segment order is kept by sending one
/// user message per image, each carrying the text that precedes it.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

impl fmt::Debug for ProviderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBackend")
            .field("label", &self.label)
            .finish()
    }
}

/// Build the chat transcript for a request.
pub(crate) fn build_messages(request: &BackendRequest) -> Vec<ChatMessage> {
    let schema_json =
        serde_json::to_string_pretty(&request.schema).unwrap_or_else(|_| request.schema.to_string());
    let system = format!(
        "{}{}",
        request.system_instruction,
        schema_instruction(&schema_json)
    );

    let mut messages = vec![ChatMessage::system(system)];
    let mut pending = String::new();

    for segment in request.payload.segments() {
        match segment {
            Segment::Text { value } => {
                if !pending.is_empty() {
                    pending.push_str("\n\n");
                }
                pending.push_str(value);
            }
            Segment::Image { mime_type, data } => {
                let image = ImageData::new(data.clone(), mime_type.as_str()).with_detail("high");
                messages.push(ChatMessage::user_with_images(pending.as_str(), vec![image]));
                pending.clear();
            }
        }
    }
    if !pending.is_empty() {
        messages.push(ChatMessage::user(pending));
    }
    messages
}

#[async_trait]
impl AuditBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &BackendRequest) -> Result<BackendReply, BackendFailure> {
        let messages = build_messages(request);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&self.label, e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        let content = Some(response.content).filter(|c| !c.trim().is_empty());
        Ok(BackendReply {
            content,
            prompt_tokens: response.prompt_tokens as usize,
            completion_tokens: response.completion_tokens as usize,
        })
    }
}

/// edgequake-llm reports errors as text; recover the auth and
/// content-filter cases from it.
fn classify_provider_error(provider: &str, detail: String) -> BackendFailure {
    let lower = detail.to_lowercase();
    let provider = provider.to_string();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("authentication")
    {
        BackendFailure::Auth { provider, detail }
    } else if lower.contains("content_filter") || lower.contains("content filter") {
        BackendFailure::Refused { provider, detail }
    } else {
        BackendFailure::Transport { provider, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(payload: PromptPayload) -> BackendRequest {
        BackendRequest {
            model: "gpt-4o".into(),
            system_instruction: "Eres un auditor.".into(),
            payload,
            schema_name: "report".into(),
            schema: json!({"type": "object"}),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }

    #[test]
    fn one_user_message_per_image_plus_trailing_text() {
        let mut payload = PromptPayload::new("instrucciones");
        payload.push(Segment::image("image/png", "QUJD"));
        payload.push(Segment::text("Página 1"));
        payload.push(Segment::image("image/jpeg", "REVG"));
        payload.push(Segment::text("[AVISO] adjunto 3"));

        let messages = build_messages(&request(payload));
        // system + image#1 (with instructions) + image#2 (with marker) + trailing advisory
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn text_only_payload_has_system_and_user() {
        let messages = build_messages(&request(PromptPayload::new("solo texto")));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn retryability() {
        let http = |status| BackendFailure::Http {
            provider: "openai".into(),
            status,
            detail: String::new(),
        };
        assert!(http(429).is_retryable());
        assert!(http(503).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(!BackendFailure::Auth {
            provider: "openai".into(),
            detail: "bad key".into()
        }
        .is_retryable());
    }

    #[test]
    fn provider_errors_are_classified() {
        assert!(matches!(
            classify_provider_error("openai", "HTTP 401 Unauthorized".into()),
            BackendFailure::Auth { .. }
        ));
        assert!(matches!(
            classify_provider_error("azure", "finish_reason=content_filter".into()),
            BackendFailure::Refused { .. }
        ));
        assert!(matches!(
            classify_provider_error("gemini", "connection reset".into()),
            BackendFailure::Transport { .. }
        ));
    }
}
