//! # foodcontact-audit
//!
//! Audit whether an industrial material is suitable for food contact, using
//! a vision LLM as the technical auditor.
//!
//! A request carries a material name, intended use, free-form notes and up
//! to three pieces of evidence (PDF datasheets, declarations of conformity,
//! photos of labels). The crate turns that into one ordered multimodal prompt,
//! sends it to the model under a strict JSON Schema at temperature 0, and
//! returns a validated [`AuditReport`] with two independent verdicts: direct
//! and indirect food contact.
//!
//! ## Pipeline Overview
//!
//! ```text
//! AuditContext
//!  │
//!  ├─ 1. Validate  at least one piece of evidence, before any I/O
//!  ├─ 2. Backend   injected / edgequake-llm provider / OpenAI-compatible
//!  ├─ 3. Render    first 3 pages of each PDF via pdfium (spawn_blocking)
//!  ├─ 4. Assemble  instructions + images + page markers, in order
//!  ├─ 5. Call      one schema-constrained request, temperature 0
//!  └─ 6. Validate  cleanup + VerdictSchema → AuditReport
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use foodcontact_audit::{submit_audit, AttachmentPayload, AuditConfig, AuditContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuditConfig::builder()
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     let pdf = std::fs::read("ficha-tecnica.pdf")?;
//!     let context = AuditContext::new()
//!         .material_name("Junta EPDM 70 Shore A")
//!         .intended_use("Junta de intercambiador de placas, leche a 80 °C")
//!         .attachment(AttachmentPayload::from_bytes("application/pdf", &pdf));
//!
//!     let report = submit_audit(&context, &config).await?;
//!     println!("directo: {}  indirecto: {}",
//!         report.direct_contact_verdict, report.indirect_contact_verdict);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `food-audit` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! foodcontact-audit = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audit::{submit_audit, submit_audit_sync, write_report, AuditClient};
pub use config::{AuditConfig, AuditConfigBuilder, AUDIT_TEMPERATURE, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use context::{AttachmentPayload, AuditContext};
pub use error::{AttachmentError, AuditError, RasterError};
pub use pipeline::assemble::{PromptPayload, RequestAssembler, Segment};
pub use pipeline::attachment::{encode, encode_all, EncodedBatch, RawAttachment};
pub use pipeline::backend::{AuditBackend, BackendFailure, BackendReply, BackendRequest, ProviderBackend};
pub use pipeline::openai::OpenAiBackend;
pub use pipeline::render::{DocumentRasterizer, PagedDocument, PdfEngine, PdfiumEngine, RasterPage, Rasterized};
pub use progress::{AuditProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::{AuditReport, Verdict, VerdictSchema};
