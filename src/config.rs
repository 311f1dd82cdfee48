//! Configuration types for food-contact audits.
//!
//! All audit behaviour is controlled through [`AuditConfig`], built via its
//! [`AuditConfigBuilder`]. The credential is part of the config: the library
//! never reads API keys from process-wide state, so tests can inject stub
//! credentials, providers or whole backends.
//!
//! Sampling temperature is deliberately absent. Every backend request carries
//! [`AUDIT_TEMPERATURE`]; the same evidence must produce the same verdict.

use crate::error::AuditError;
use crate::pipeline::backend::AuditBackend;
use crate::pipeline::render::PdfEngine;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Sampling temperature pinned on every backend request.
pub const AUDIT_TEMPERATURE: f32 = 0.0;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI-compatible endpoint used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for a food-contact audit.
///
/// # Example
/// ```rust
/// use foodcontact_audit::AuditConfig;
///
/// let config = AuditConfig::builder()
///     .api_key("sk-test")
///     .model("gpt-4o")
///     .max_pdf_pages(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attachments, 3);
/// ```
#[derive(Clone)]
pub struct AuditConfig {
    /// API credential for the OpenAI-compatible backend.
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint. Default: OpenAI.
    pub base_url: String,

    /// Model identifier, e.g. "gpt-4o". If None, [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// edgequake-llm provider name ("openai", "anthropic", "gemini", …).
    /// When set, the audit goes through that provider instead of the
    /// built-in OpenAI-compatible client.
    pub provider_name: Option<String>,

    /// Pre-constructed edgequake-llm provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed backend. Takes precedence over everything else.
    pub backend: Option<Arc<dyn AuditBackend>>,

    /// Maximum tokens the model may generate. Default: 4096.
    pub max_tokens: usize,

    /// Retries on backend failure. Default: 0 (a single call per audit).
    ///
    /// Schema violations and authentication failures are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Transport timeout for the backend call, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Attachment bound enforced by callers (the CLI, a UI). Default: 3.
    pub max_attachments: usize,

    /// Pages rasterised per PDF, starting at page 1. Default: 3.
    ///
    /// Keeps prompt size and vision latency bounded regardless of document length.
    pub max_pdf_pages: usize,

    /// Render scale relative to the PDF's 72-dpi page size. Default: 1.5.
    pub render_scale: f32,

    /// JPEG quality (1–100) for rendered pages and re-encoded images. Default: 80.
    pub jpeg_quality: u8,

    /// Emit a "page N of attachment M" text segment before each PDF page. Default: true.
    pub page_markers: bool,

    /// Path to a pdfium shared library (file or directory).
    /// If None, `PDFIUM_LIB_PATH` is tried, then the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Pre-constructed PDF engine. Takes precedence over `pdfium_lib_path`.
    pub pdf_engine: Option<Arc<dyn PdfEngine>>,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            provider_name: None,
            provider: None,
            backend: None,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            max_attachments: 3,
            max_pdf_pages: 3,
            render_scale: 1.5,
            jpeg_quality: 80,
            page_markers: true,
            pdfium_lib_path: None,
            pdf_engine: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("backend", &self.backend.as_ref().map(|_| "<dyn AuditBackend>"))
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_attachments", &self.max_attachments)
            .field("max_pdf_pages", &self.max_pdf_pages)
            .field("render_scale", &self.render_scale)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("page_markers", &self.page_markers)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl AuditConfig {
    /// Create a new builder for `AuditConfig`.
    pub fn builder() -> AuditConfigBuilder {
        AuditConfigBuilder {
            config: Self::default(),
        }
    }

    /// Configured model or [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`AuditConfig`].
pub struct AuditConfigBuilder {
    config: AuditConfig,
}

impl AuditConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn AuditBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_attachments(mut self, n: usize) -> Self {
        self.config.max_attachments = n;
        self
    }

    pub fn max_pdf_pages(mut self, n: usize) -> Self {
        self.config.max_pdf_pages = n;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn page_markers(mut self, v: bool) -> Self {
        self.config.page_markers = v;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn pdf_engine(mut self, engine: Arc<dyn PdfEngine>) -> Self {
        self.config.pdf_engine = Some(engine);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AuditConfig, AuditError> {
        let c = &self.config;
        if c.max_attachments == 0 {
            return Err(AuditError::InvalidConfig(
                "max_attachments must be ≥ 1".into(),
            ));
        }
        if c.max_pdf_pages == 0 {
            return Err(AuditError::InvalidConfig("max_pdf_pages must be ≥ 1".into()));
        }
        if !(0.25..=4.0).contains(&c.render_scale) {
            return Err(AuditError::InvalidConfig(format!(
                "render_scale must be 0.25–4.0, got {}",
                c.render_scale
            )));
        }
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(AuditError::InvalidConfig(format!(
                "jpeg_quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(AuditError::InvalidConfig(format!(
                "base_url must be an HTTP/HTTPS URL, got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let c = AuditConfig::default();
        assert_eq!(c.max_attachments, 3);
        assert_eq!(c.max_pdf_pages, 3);
        assert_eq!(c.render_scale, 1.5);
        assert_eq!(c.jpeg_quality, 80);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
        assert_eq!(AUDIT_TEMPERATURE, 0.0);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = AuditConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn builder_rejects_invalid_values() {
        assert!(AuditConfig::builder().max_pdf_pages(0).build().is_err());
        assert!(AuditConfig::builder().jpeg_quality(0).build().is_err());
        assert!(AuditConfig::builder().render_scale(10.0).build().is_err());
        assert!(AuditConfig::builder().base_url("ftp://x").build().is_err());
        assert!(AuditConfig::builder().max_attachments(0).build().is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let c = AuditConfig::builder()
            .model("gpt-4o-mini")
            .max_retries(2)
            .page_markers(false)
            .pdfium_lib_path("/opt/pdfium")
            .build()
            .unwrap();
        assert_eq!(c.model_or_default(), "gpt-4o-mini");
        assert_eq!(c.max_retries, 2);
        assert!(!c.page_markers);
        assert_eq!(c.pdfium_lib_path, Some(PathBuf::from("/opt/pdfium")));
    }
}
