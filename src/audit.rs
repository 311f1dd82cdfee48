//! Audit entry points and the schema-constrained backend client.
//!
//! [`submit_audit`] is the one call a host makes: it validates the context,
//! resolves the backend, assembles the prompt and returns a validated
//! [`AuditReport`] or a typed [`AuditError`]. [`AuditClient`] is the lower
//! layer that sends an already-assembled [`PromptPayload`].

use crate::config::{AuditConfig, AUDIT_TEMPERATURE};
use crate::context::AuditContext;
use crate::error::AuditError;
use crate::pipeline::assemble::{PromptPayload, RequestAssembler};
use crate::pipeline::backend::{
    AuditBackend, BackendFailure, BackendReply, BackendRequest, ProviderBackend,
};
use crate::pipeline::openai::OpenAiBackend;
use crate::pipeline::render::DocumentRasterizer;
use crate::pipeline::response::clean_json_text;
use crate::progress::ProgressCallback;
use crate::prompts::SYSTEM_INSTRUCTION;
use crate::schema::{AuditReport, VerdictSchema};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Sends prompt payloads to the configured backend and validates replies.
#[derive(Clone)]
pub struct AuditClient {
    backend: Arc<dyn AuditBackend>,
    model: String,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for AuditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditClient")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl AuditClient {
    /// Resolve the backend for `config`.
    ///
    /// Fails with [`AuditError::Configuration`] when nothing is configured;
    /// no network call is attempted in that case.
    pub fn from_config(config: &AuditConfig) -> Result<Self, AuditError> {
        let backend = resolve_backend(config)?;
        Ok(Self {
            backend,
            model: config.model_or_default().to_string(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            progress: config.progress_callback.clone(),
        })
    }

    /// Name of the resolved backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Send `payload` constrained by `schema` and return the validated report.
    ///
    /// # Errors
    /// * [`AuditError::Backend`]: the call failed
    /// * [`AuditError::EmptyResponse`]: the reply carried no content
    /// * [`AuditError::SchemaViolation`]: the content is not JSON or breaks the schema
    pub async fn submit(
        &self,
        payload: &PromptPayload,
        schema: &VerdictSchema,
    ) -> Result<AuditReport, AuditError> {
        let request = BackendRequest {
            model: self.model.clone(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            payload: payload.clone(),
            schema_name: schema.name().to_string(),
            schema: schema.as_json().clone(),
            temperature: AUDIT_TEMPERATURE,
            max_tokens: self.max_tokens,
        };

        let start = Instant::now();
        let reply = self.generate_with_retry(&request).await?;
        info!(
            "{} replied in {}ms ({} input / {} output tokens)",
            self.backend.name(),
            start.elapsed().as_millis(),
            reply.prompt_tokens,
            reply.completion_tokens
        );

        let content = reply.content.ok_or(AuditError::EmptyResponse)?;
        let cleaned = clean_json_text(&content);
        if cleaned.is_empty() {
            return Err(AuditError::EmptyResponse);
        }
        debug!("Raw verdict JSON: {} bytes", cleaned.len());
        schema.parse(&cleaned)
    }

    /// One call, plus up to `max_retries` retries on retryable failures.
    async fn generate_with_retry(
        &self,
        request: &BackendRequest,
    ) -> Result<BackendReply, AuditError> {
        let mut last: Option<BackendFailure> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay_ms(self.retry_backoff_ms, attempt);
                info!(
                    "Backend retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            if let Some(ref cb) = self.progress {
                cb.on_backend_call(attempt);
            }

            match self.backend.generate(request).await {
                Ok(reply) => return Ok(reply),
                Err(failure) => {
                    warn!("Backend attempt {} failed: {}", attempt + 1, failure);
                    let retryable = failure.is_retryable();
                    last = Some(failure);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(AuditError::Backend {
            message: last
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string()),
        })
    }
}

/// Upper bound for a single retry delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// saturating and capped at [`MAX_BACKOFF_MS`].
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Audit a food-contact material.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Checked in this order, each before any later side effect:
/// 1. [`AuditError::Validation`]: the context carries no evidence at all
/// 2. [`AuditError::Configuration`]: no backend or credential
/// 3. backend, empty-response and schema errors from [`AuditClient::submit`]
///
/// Unreadable attachments never fail the audit; they become advisory notes.
pub async fn submit_audit(
    context: &AuditContext,
    config: &AuditConfig,
) -> Result<AuditReport, AuditError> {
    let progress = config.progress_callback.clone();
    if let Some(ref cb) = progress {
        cb.on_audit_start(context.files_data.len());
    }

    let result = run_audit(context, config).await;

    if let Some(ref cb) = progress {
        cb.on_audit_complete(result.is_ok());
    }
    result
}

async fn run_audit(context: &AuditContext, config: &AuditConfig) -> Result<AuditReport, AuditError> {
    let total_start = Instant::now();

    // ── Step 1: Validate ─────────────────────────────────────────────────
    context.validate()?;

    // ── Step 2: Resolve backend ──────────────────────────────────────────
    let client = AuditClient::from_config(config)?;
    info!(
        "Starting audit of '{}' via {} ({} attachments)",
        context.material().unwrap_or("material sin nombre"),
        client.backend_name(),
        context.files_data.len()
    );

    // ── Step 3: Assemble prompt ──────────────────────────────────────────
    let assembler = RequestAssembler::new(
        DocumentRasterizer::from_config(config),
        config.page_markers,
        config.jpeg_quality,
    )
    .with_progress(config.progress_callback.clone());
    let payload = assembler.assemble(context).await;

    // ── Step 4: Call backend and validate ────────────────────────────────
    let report = client.submit(&payload, &VerdictSchema::audit_report()).await?;

    info!(
        "Audit complete in {}ms: direct={}, indirect={}",
        total_start.elapsed().as_millis(),
        report.direct_contact_verdict,
        report.indirect_contact_verdict
    );
    Ok(report)
}

/// Synchronous wrapper around [`submit_audit`].
///
/// Creates a temporary tokio runtime internally.
pub fn submit_audit_sync(
    context: &AuditContext,
    config: &AuditConfig,
) -> Result<AuditReport, AuditError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AuditError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(submit_audit(context, config))
}

/// Write an exported report atomically.
///
/// The contents go to a temp file in the target directory which is then
/// renamed over `path`, so readers never see a partial report.
pub async fn write_report(path: impl AsRef<Path>, contents: &str) -> Result<(), AuditError> {
    let path = path.as_ref();
    let failed = |source: std::io::Error| AuditError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(failed)?;
    tmp.write_all(contents.as_bytes()).map_err(failed)?;
    tmp.persist(path).map_err(|e| failed(e.error))?;
    debug!("Report written to {}", path.display());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Instantiate a named edgequake-llm provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AuditError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AuditError::Configuration(format!("provider '{}' unavailable: {}", provider_name, e))
    })
}

/// Resolve the backend, from most-specific to least-specific:
///
/// 1. injected backend (`config.backend`)
/// 2. pre-built edgequake-llm provider (`config.provider`)
/// 3. named provider (`config.provider_name`) via [`ProviderFactory`]
/// 4. explicit `api_key` with the OpenAI-compatible client
fn resolve_backend(config: &AuditConfig) -> Result<Arc<dyn AuditBackend>, AuditError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderBackend::new(
            Arc::clone(provider),
            "edgequake-llm",
        )));
    }

    if let Some(ref name) = config.provider_name {
        let provider = create_provider(name, config.model_or_default())?;
        return Ok(Arc::new(ProviderBackend::new(provider, name.clone())));
    }

    match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => {
            let backend = OpenAiBackend::new(key, &config.base_url, config.api_timeout_secs)
                .map_err(|e| AuditError::Configuration(e.to_string()))?;
            Ok(Arc::new(backend))
        }
        _ => Err(AuditError::Configuration(
            "no API key, provider or backend configured".to_string(),
        )),
    }
}
