//! Attachment codec: raw files → [`AttachmentPayload`].
//!
//! Reads each file fully, settles its MIME type and Base64-encodes the bytes.
//! Files from disk and in-memory buffers go through the same path. Only
//! `image/*` and `application/pdf` are accepted; anything else is reported as
//! [`AttachmentError::Unsupported`] and treated as absent by the caller.
//!
//! [`encode_all`] reads every file concurrently and waits for all of them to
//! settle. One unreadable file never aborts the batch.

use crate::context::{is_supported_mime, AttachmentPayload, PDF_MIME};
use crate::error::AttachmentError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where the attachment bytes come from.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    /// A file on disk (file picker, CLI argument).
    Path(PathBuf),
    /// Bytes already in memory (drag-and-drop, upload body).
    Bytes(Vec<u8>),
}

/// A file handle as handed over by the UI collaborator.
#[derive(Debug, Clone)]
pub struct RawAttachment {
    pub name: String,
    /// Declared MIME type. Missing or `application/octet-stream` triggers sniffing.
    pub mime_type: Option<String>,
    pub source: AttachmentSource,
}

impl RawAttachment {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            mime_type: None,
            source: AttachmentSource::Path(path),
        }
    }

    pub fn from_bytes(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            source: AttachmentSource::Bytes(bytes),
        }
    }
}

/// Outcome of [`encode_all`]: accepted payloads in submission order plus the
/// per-file errors.
#[derive(Debug, Default)]
pub struct EncodedBatch {
    pub accepted: Vec<AttachmentPayload>,
    pub rejected: Vec<AttachmentError>,
}

/// Read and encode a single attachment.
pub async fn encode(raw: RawAttachment) -> Result<AttachmentPayload, AttachmentError> {
    let RawAttachment {
        name,
        mime_type,
        source,
    } = raw;

    let (bytes, path) = match source {
        AttachmentSource::Bytes(b) => (b, None),
        AttachmentSource::Path(p) => {
            let bytes = tokio::fs::read(&p)
                .await
                .map_err(|e| AttachmentError::Read {
                    name: name.clone(),
                    source: e,
                })?;
            (bytes, Some(p))
        }
    };

    let mime = resolve_mime(mime_type.as_deref(), &bytes, path.as_deref());
    if !is_supported_mime(&mime) {
        return Err(AttachmentError::Unsupported {
            name,
            mime_type: mime,
        });
    }

    let data = STANDARD.encode(&bytes);
    debug!("Encoded attachment '{}' ({}) → {} bytes base64", name, mime, data.len());

    Ok(AttachmentPayload::new(mime, data).with_name(name))
}

/// Encode every attachment concurrently and wait for all of them.
pub async fn encode_all(raws: Vec<RawAttachment>) -> EncodedBatch {
    let results = join_all(raws.into_iter().map(encode)).await;

    let mut batch = EncodedBatch::default();
    for result in results {
        match result {
            Ok(payload) => batch.accepted.push(payload),
            Err(e) => {
                warn!("{}", e);
                batch.rejected.push(e);
            }
        }
    }
    batch
}

/// Settle the MIME type: declared type, then content sniffing, then extension.
fn resolve_mime(declared: Option<&str>, bytes: &[u8], path: Option<&Path>) -> String {
    if let Some(d) = declared.map(str::trim).filter(|d| !d.is_empty()) {
        if !d.eq_ignore_ascii_case("application/octet-stream") {
            return d.to_ascii_lowercase();
        }
    }
    if let Some(sniffed) = sniff_mime(bytes) {
        return sniffed.to_string();
    }
    path.and_then(mime_from_extension)
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Recognise PDFs and the image formats the `image` crate knows.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some(PDF_MIME);
    }
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "pdf" => PDF_MIME,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        _ => return None,
    })
}
