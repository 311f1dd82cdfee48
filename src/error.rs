//! Error types for the foodcontact-audit library.
//!
//! Two families of errors reflect two distinct failure modes:
//!
//! * [`AuditError`]: **Fatal**: the audit cannot produce a verdict at all
//!   (no credential, empty request, backend down, response breaks the
//!   verdict schema). Returned as `Err(AuditError)` from
//!   [`crate::audit::submit_audit`] and [`crate::audit::AuditClient::submit`].
//!
//! * [`AttachmentError`] and [`RasterError`]: **Non-fatal**: one attachment
//!   could not be read or one PDF (or one of its pages) could not be
//!   rasterised. The audit continues with the remaining evidence and an
//!   advisory note in the prompt; these errors only surface through logs and
//!   [`crate::progress::AuditProgressCallback`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the foodcontact-audit library.
#[derive(Debug, Error)]
pub enum AuditError {
    // ── Precondition errors ───────────────────────────────────────────────
    /// No backend credential or provider is configured. Raised before any
    /// network attempt.
    #[error("Audit backend is not configured: {0}\nSet FOOD_AUDIT_API_KEY (or OPENAI_API_KEY), or pass --provider.")]
    Configuration(String),

    /// The audit request carries no material name, no intended use, no notes
    /// and no attachments.
    #[error("Invalid audit request: {0}")]
    Validation(String),

    // ── Backend errors ────────────────────────────────────────────────────
    /// Transport or backend failure (HTTP error, auth rejection, timeout).
    #[error("Audit backend error: {message}")]
    Backend { message: String },

    /// The backend answered but the message carried no content.
    #[error("Audit backend returned no content; no report could be generated")]
    EmptyResponse,

    /// The content is not JSON or does not conform to the verdict schema.
    #[error("Audit response violates the verdict schema: {detail}")]
    SchemaViolation { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the exported report file.
    #[error("Failed to write report file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or pass --pdfium-lib) to use an existing copy,\n\
or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuditError {
    /// True for transport/backend failures, including empty replies.
    pub fn is_backend(&self) -> bool {
        matches!(self, AuditError::Backend { .. } | AuditError::EmptyResponse)
    }

    /// True when the backend replied but the reply broke the verdict contract.
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, AuditError::SchemaViolation { .. })
    }
}

/// A non-fatal error for a single attachment.
///
/// The batch continues: other attachments are encoded independently.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Reading the file failed (missing, permission, I/O error).
    #[error("Attachment '{name}': read failed: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Neither `image/*` nor `application/pdf`.
    #[error("Attachment '{name}': unsupported type '{mime_type}' (only images and PDF are accepted)")]
    Unsupported { name: String, mime_type: String },
}

/// A non-fatal rasterisation error.
///
/// Document-level variants make the whole PDF degrade to zero pages;
/// [`RasterError::PageFailed`] only drops the affected page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RasterError {
    /// The payload is not valid Base64.
    #[error("PDF payload is not valid base64: {0}")]
    Decode(String),

    /// The decoded bytes do not start with the `%PDF` magic.
    #[error("Payload is not a PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// pdfium (or the configured engine) refused the document: corrupt,
    /// encrypted or unsupported.
    #[error("PDF could not be loaded: {0}")]
    LoadFailed(String),

    /// A single page failed to render.
    #[error("Page {page}: rendering failed: {detail}")]
    PageFailed { page: usize, detail: String },

    /// A rendered page could not be re-encoded as JPEG.
    #[error("Page {page}: JPEG encoding failed: {detail}")]
    Encode { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_display_mentions_env_var() {
        let e = AuditError::Configuration("no API credential".into());
        let msg = e.to_string();
        assert!(msg.contains("no API credential"), "got: {msg}");
        assert!(msg.contains("FOOD_AUDIT_API_KEY"), "got: {msg}");
    }

    #[test]
    fn schema_violation_display() {
        let e = AuditError::SchemaViolation {
            detail: "missing field(s): finalConclusion".into(),
        };
        assert!(e.to_string().contains("finalConclusion"));
        assert!(e.is_schema_violation());
        assert!(!e.is_backend());
    }

    #[test]
    fn empty_response_is_backend_error() {
        assert!(AuditError::EmptyResponse.is_backend());
        assert!(AuditError::Backend {
            message: "HTTP 500".into()
        }
        .is_backend());
        assert!(!AuditError::Validation("empty".into()).is_backend());
    }

    #[test]
    fn raster_page_failure_display() {
        let e = RasterError::PageFailed {
            page: 2,
            detail: "bitmap allocation".into(),
        };
        assert!(e.to_string().contains("Page 2"));
    }

    #[test]
    fn unsupported_attachment_display() {
        let e = AttachmentError::Unsupported {
            name: "notes.docx".into(),
            mime_type: "application/msword".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.docx"));
        assert!(msg.contains("application/msword"));
    }
}
