//! Input types: the audit request and its attachments.
//!
//! An [`AuditContext`] is built once per submission and handed by value to
//! the pipeline. Attachments travel as [`AttachmentPayload`]s: a MIME type
//! plus Base64 data, with or without a `data:<mime>;base64,` prefix. Every
//! consumer goes through [`strip_data_uri`] so both spellings behave the same.

use crate::error::AuditError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// MIME type of PDF attachments.
pub const PDF_MIME: &str = "application/pdf";

/// One user-supplied file, already encoded for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    pub mime_type: String,
    /// Base64 payload, optionally carrying a data-URI prefix.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AttachmentPayload {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
            name: None,
        }
    }

    /// Encode raw file bytes.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(mime_type, STANDARD.encode(bytes))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The Base64 body with any data-URI prefix removed.
    pub fn base64_body(&self) -> &str {
        strip_data_uri(&self.data)
    }

    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mime_type)
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(PDF_MIME)
    }

    /// Display label used in advisories and logs.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("sin nombre")
    }
}

/// The normalised audit request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_name: Option<String>,
    #[serde(default)]
    pub intended_use: String,
    #[serde(default)]
    pub technical_data: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_data: Vec<AttachmentPayload>,
}

impl AuditContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn material_name(mut self, name: impl Into<String>) -> Self {
        self.material_name = Some(name.into());
        self
    }

    pub fn intended_use(mut self, usage: impl Into<String>) -> Self {
        self.intended_use = usage.into();
        self
    }

    pub fn technical_data(mut self, notes: impl Into<String>) -> Self {
        self.technical_data = notes.into();
        self
    }

    pub fn attachment(mut self, file: AttachmentPayload) -> Self {
        self.files_data.push(file);
        self
    }

    /// Trimmed material name, `None` when absent or blank.
    pub fn material(&self) -> Option<&str> {
        self.material_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Reject a context with no usable evidence at all.
    ///
    /// Whitespace-only fields count as empty.
    pub fn validate(&self) -> Result<(), AuditError> {
        let has_text = self.material().is_some()
            || !self.intended_use.trim().is_empty()
            || !self.technical_data.trim().is_empty();

        if has_text || !self.files_data.is_empty() {
            Ok(())
        } else {
            Err(AuditError::Validation(
                "provide a material name, an intended use, notes or at least one attachment".into(),
            ))
        }
    }
}

/// `true` for `image/*` MIME types.
pub fn is_image_mime(mime: &str) -> bool {
    mime.get(..6)
        .map(|p| p.eq_ignore_ascii_case("image/"))
        .unwrap_or(false)
}

/// `true` for the MIME types the audit accepts as evidence.
pub fn is_supported_mime(mime: &str) -> bool {
    is_image_mime(mime) || mime.eq_ignore_ascii_case(PDF_MIME)
}

/// Strip a `data:<mime>;base64,` prefix, returning the bare Base64 body.
///
/// Strings without a prefix are returned unchanged (trimmed).
pub fn strip_data_uri(data: &str) -> &str {
    let data = data.trim();
    if data.starts_with("data:") {
        if let Some((_, body)) = data.split_once(',') {
            return body;
        }
    }
    data
}

/// Wrap a bare Base64 body into a data URI.
pub fn to_data_uri(mime_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", mime_type, strip_data_uri(data))
}
