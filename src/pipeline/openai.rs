//! OpenAI-compatible chat-completions backend with strict structured output.
//!
//! The request mirrors the prompt payload one-to-one: a system message with
//! the auditor persona, then a single user message whose content array holds
//! the text and image parts in payload order. The verdict schema is passed as
//! `response_format: json_schema` with `strict: true`, so conforming servers
//! constrain decoding to the schema; the client still validates the reply.
//!
//! Works against api.openai.com and compatible gateways (Azure-style proxies,
//! vLLM, LiteLLM) via [`crate::config::AuditConfig::base_url`].

use crate::context::to_data_uri;
use crate::pipeline::assemble::Segment;
use crate::pipeline::backend::{AuditBackend, BackendFailure, BackendReply, BackendRequest};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "openai-compatible";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    r#type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

/// HTTP client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenAiBackend {
    /// Create a client. `timeout_secs` bounds the whole HTTP exchange.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, BackendFailure> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackendFailure::Transport {
                provider: PROVIDER.into(),
                detail: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Model families that reject `max_tokens` and take `max_completion_tokens`.
const COMPLETION_TOKEN_MODELS: [&str; 5] = ["gpt-4.1", "gpt-5", "o1", "o3", "o4"];

fn uses_completion_tokens(model: &str) -> bool {
    let model = model.rsplit('/').next().unwrap_or(model).to_ascii_lowercase();
    COMPLETION_TOKEN_MODELS
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// Translate a backend request into the wire body.
fn build_body(request: &BackendRequest) -> ChatRequest<'_> {
    let parts = request
        .payload
        .segments()
        .iter()
        .map(|segment| match segment {
            Segment::Text { value } => ContentPart::Text { text: value },
            Segment::Image { mime_type, data } => ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: to_data_uri(mime_type, data),
                    detail: "high",
                },
            },
        })
        .collect();

    let (max_tokens, max_completion_tokens) = if uses_completion_tokens(&request.model) {
        (None, Some(request.max_tokens))
    } else {
        (Some(request.max_tokens), None)
    };

    ChatRequest {
        model: &request.model,
        messages: vec![
            Message {
                role: "system",
                content: MessageContent::Text(&request.system_instruction),
            },
            Message {
                role: "user",
                content: MessageContent::Parts(parts),
            },
        ],
        temperature: request.temperature,
        max_tokens,
        max_completion_tokens,
        response_format: ResponseFormat {
            r#type: "json_schema",
            json_schema: JsonSchemaFormat {
                name: &request.schema_name,
                strict: true,
                schema: &request.schema,
            },
        },
    }
}

/// Turn a parsed response into a reply, surfacing refusals.
fn interpret(response: ChatResponse) -> Result<BackendReply, BackendFailure> {
    let (prompt_tokens, completion_tokens) = response
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));

    let Some(choice) = response.choices.into_iter().next() else {
        return Ok(BackendReply {
            content: None,
            prompt_tokens,
            completion_tokens,
        });
    };

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(BackendFailure::Refused {
            provider: PROVIDER.into(),
            detail: "finish_reason=content_filter".into(),
        });
    }
    if let Some(refusal) = choice.message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(BackendFailure::Refused {
            provider: PROVIDER.into(),
            detail: refusal,
        });
    }

    Ok(BackendReply {
        content: choice.message.content.filter(|c| !c.trim().is_empty()),
        prompt_tokens,
        completion_tokens,
    })
}

#[async_trait]
impl AuditBackend for OpenAiBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &BackendRequest) -> Result<BackendReply, BackendFailure> {
        let body = build_body(request);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendFailure::Transport {
                provider: PROVIDER.into(),
                detail: if e.is_timeout() {
                    format!("timed out: {e}")
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendFailure::Auth {
                    provider: PROVIDER.into(),
                    detail,
                },
                _ => BackendFailure::Http {
                    provider: PROVIDER.into(),
                    status: status.as_u16(),
                    detail,
                },
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| BackendFailure::Transport {
            provider: PROVIDER.into(),
            detail: format!("unreadable response body: {e}"),
        })?;

        let reply = interpret(parsed)?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            PROVIDER, reply.prompt_tokens, reply.completion_tokens
        );
        Ok(reply)
    }
}
