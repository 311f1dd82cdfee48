//! Request assembly: [`AuditContext`] → ordered [`PromptPayload`].
//!
//! Segment order is part of the contract. The instruction text comes first,
//! then each attachment in submission order: images as-is, PDFs as their
//! rendered pages in ascending order, each page optionally preceded by a
//! provenance marker. Evidence that cannot be shown to the model becomes an
//! advisory text segment; unsupported binary data is never forwarded.

use crate::context::{strip_data_uri, AttachmentPayload, AuditContext};
use crate::error::RasterError;
use crate::pipeline::encode::{is_forwardable, reencode_as_jpeg, sniff_image_mime};
use crate::pipeline::render::DocumentRasterizer;
use crate::progress::ProgressCallback;
use crate::prompts;
use serde::Serialize;
use tracing::{debug, info, warn};

/// One element of the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Segment {
    Text {
        value: String,
    },
    Image {
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// Bare Base64 (no data-URI prefix).
        data: String,
    },
}

impl Segment {
    pub fn text(value: impl Into<String>) -> Self {
        Segment::Text {
            value: value.into(),
        }
    }

    /// Image segment; any data-URI prefix on `data` is stripped.
    pub fn image(mime_type: impl Into<String>, data: &str) -> Self {
        Segment::Image {
            mime_type: mime_type.into(),
            data: strip_data_uri(data).to_string(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Segment::Text { .. })
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Segment::Image { .. })
    }
}

/// The ordered segment sequence sent to the backend for one audit.
///
/// Always starts with a text segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PromptPayload {
    segments: Vec<Segment>,
}

impl PromptPayload {
    /// Start a payload with its leading instruction text.
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::text(instructions)],
        }
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn image_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_image()).count()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Never true: a payload always has its instruction segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Builds the prompt payload for an audit.
#[derive(Clone)]
pub struct RequestAssembler {
    rasterizer: DocumentRasterizer,
    page_markers: bool,
    jpeg_quality: u8,
    progress: Option<ProgressCallback>,
}

impl RequestAssembler {
    pub fn new(rasterizer: DocumentRasterizer, page_markers: bool, jpeg_quality: u8) -> Self {
        Self {
            rasterizer,
            page_markers,
            jpeg_quality,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Assemble the payload. Never fails: unusable attachments degrade to
    /// advisory text.
    pub async fn assemble(&self, context: &AuditContext) -> PromptPayload {
        let mut payload = PromptPayload::new(prompts::request_text(context));

        for (i, file) in context.files_data.iter().enumerate() {
            let index = i + 1;
            if file.is_pdf() {
                self.push_pdf(&mut payload, index, file).await;
            } else if file.is_image() {
                self.push_image(&mut payload, index, file);
            } else {
                warn!(
                    "Attachment {} ({}) has unsupported type '{}'; not forwarded",
                    index,
                    file.label(),
                    file.mime_type
                );
                payload.push(Segment::text(prompts::unsupported_attachment_advisory(
                    index,
                    file.label(),
                    &file.mime_type,
                )));
                self.degraded(index, file, "unsupported type");
            }
        }

        info!(
            "Prompt assembled: {} segments, {} images",
            payload.len(),
            payload.image_count()
        );
        payload
    }

    async fn push_pdf(&self, payload: &mut PromptPayload, index: usize, file: &AttachmentPayload) {
        let outcome = self.rasterizer.try_rasterize(&file.data).await;
        let (pages, reason) = match outcome {
            Ok(r) if !r.pages.is_empty() => (r.pages, None),
            Ok(r) => (
                Vec::new(),
                Some(
                    r.page_errors
                        .first()
                        .map(RasterError::to_string)
                        .unwrap_or_else(|| "document has no pages".to_string()),
                ),
            ),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        if let Some(reason) = reason {
            warn!("Attachment {} ({}): {}", index, file.label(), reason);
            payload.push(Segment::text(prompts::unreadable_pdf_advisory(
                index,
                file.label(),
            )));
            self.degraded(index, file, &reason);
            return;
        }

        let count = pages.len();
        for page in pages {
            if self.page_markers {
                payload.push(Segment::text(prompts::page_marker(
                    page.index,
                    index,
                    file.label(),
                )));
            }
            payload.push(Segment::image("image/jpeg", &page.image));
        }
        debug!("Attachment {} ({}): {} pages", index, file.label(), count);
        if let Some(ref cb) = self.progress {
            cb.on_attachment_prepared(index, file.label(), count);
        }
    }

    fn push_image(&self, payload: &mut PromptPayload, index: usize, file: &AttachmentPayload) {
        // Forwarded bytes must really be the image they claim to be.
        let segment = if is_forwardable(&file.mime_type) {
            sniff_image_mime(file.base64_body()).and_then(|sniffed| {
                if is_forwardable(sniffed) {
                    Ok(Segment::image(sniffed, &file.data))
                } else {
                    reencode_as_jpeg(file.base64_body(), self.jpeg_quality)
                        .map(|jpeg| Segment::image("image/jpeg", &jpeg))
                }
            })
        } else {
            reencode_as_jpeg(file.base64_body(), self.jpeg_quality)
                .map(|jpeg| Segment::image("image/jpeg", &jpeg))
        };

        match segment {
            Ok(s) => {
                payload.push(s);
                if let Some(ref cb) = self.progress {
                    cb.on_attachment_prepared(index, file.label(), 1);
                }
            }
            Err(reason) => {
                warn!("Attachment {} ({}): {}", index, file.label(), reason);
                payload.push(Segment::text(prompts::unreadable_image_advisory(
                    index,
                    file.label(),
                )));
                self.degraded(index, file, &reason);
            }
        }
    }

    fn degraded(&self, index: usize, file: &AttachmentPayload, reason: &str) {
        if let Some(ref cb) = self.progress {
            cb.on_attachment_degraded(index, file.label(), reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::{PagedDocument, PdfEngine};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::Arc;

    struct TwoPages;

    impl PagedDocument for TwoPages {
        fn page_count(&self) -> usize {
            2
        }
        fn render_page(&self, _index: usize, _scale: f32) -> Result<DynamicImage, String> {
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                8,
                8,
                Rgba([255, 255, 255, 255]),
            )))
        }
    }

    struct TwoPageEngine;

    impl PdfEngine for TwoPageEngine {
        fn with_document(
            &self,
            _bytes: &[u8],
            visit: &mut dyn FnMut(&dyn PagedDocument),
        ) -> Result<(), RasterError> {
            visit(&TwoPages);
            Ok(())
        }
    }

    fn assembler(markers: bool) -> RequestAssembler {
        let rasterizer = DocumentRasterizer::new(Arc::new(TwoPageEngine), 3, 1.5, 80);
        RequestAssembler::new(rasterizer, markers, 80)
    }

    fn kinds(payload: &PromptPayload) -> Vec<&'static str> {
        payload
            .segments()
            .iter()
            .map(|s| if s.is_text() { "text" } else { "image" })
            .collect()
    }

    fn pdf() -> AttachmentPayload {
        AttachmentPayload::new("application/pdf", STANDARD.encode(b"%PDF-1.4")).with_name("ficha.pdf")
    }

    #[tokio::test]
    async fn text_only_context_yields_single_segment() {
        let payload = assembler(true)
            .assemble(&AuditContext::new().material_name("Junta"))
            .await;
        assert_eq!(kinds(&payload), vec!["text"]);
    }

    #[tokio::test]
    async fn image_then_pdf_keeps_order_with_markers() {
        let ctx = AuditContext::new()
            .attachment(AttachmentPayload::new("image/png", "data:image/png;base64,iVBORw0KGgo="))
            .attachment(pdf());
        let payload = assembler(true).assemble(&ctx).await;
        assert_eq!(
            kinds(&payload),
            vec!["text", "image", "text", "image", "text", "image"]
        );
        match &payload.segments()[1] {
            Segment::Image { data, .. } => assert_eq!(data, "iVBORw0KGgo="),
            other => panic!("expected image, got {other:?}"),
        }
        match &payload.segments()[2] {
            Segment::Text { value } => assert!(value.starts_with("Página 1 ")),
            other => panic!("expected marker, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn markers_can_be_disabled() {
        let payload = assembler(false)
            .assemble(&AuditContext::new().attachment(pdf()))
            .await;
        assert_eq!(kinds(&payload), vec!["text", "image", "image"]);
    }

    #[tokio::test]
    async fn corrupt_pdf_becomes_one_advisory() {
        let broken = AttachmentPayload::new("application/pdf", STANDARD.encode(b"garbage"));
        let payload = assembler(true)
            .assemble(&AuditContext::new().attachment(broken))
            .await;
        assert_eq!(kinds(&payload), vec!["text", "text"]);
        match &payload.segments()[1] {
            Segment::Text { value } => assert!(value.contains("[AVISO]")),
            other => panic!("expected advisory, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_attachment_is_never_forwarded() {
        let zip = AttachmentPayload::new("application/zip", STANDARD.encode(b"PK\x03\x04"));
        let payload = assembler(true)
            .assemble(&AuditContext::new().attachment(zip))
            .await;
        assert_eq!(payload.image_count(), 0);
        assert_eq!(payload.len(), 2);
    }

    #[tokio::test]
    async fn undecodable_exotic_image_becomes_advisory() {
        let tiff = AttachmentPayload::new("image/tiff", STANDARD.encode(b"nope"));
        let payload = assembler(true)
            .assemble(&AuditContext::new().attachment(tiff))
            .await;
        assert_eq!(kinds(&payload), vec!["text", "text"]);
    }

    #[tokio::test]
    async fn corrupt_png_becomes_advisory() {
        for body in ["bm90IGFuIGltYWdl", "@@@ not base64 @@@"] {
            let png = AttachmentPayload::new("image/png", body).with_name("foto.png");
            let payload = assembler(true)
                .assemble(&AuditContext::new().attachment(png))
                .await;
            assert_eq!(kinds(&payload), vec!["text", "text"], "body {body:?}");
            match &payload.segments()[1] {
                Segment::Text { value } => assert!(value.contains("[AVISO]")),
                other => panic!("expected advisory, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn mislabelled_image_is_sent_with_its_real_type() {
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])))
            .to_rgb8()
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();
        let labelled_png = AttachmentPayload::new("image/png", STANDARD.encode(&jpeg));
        let payload = assembler(true)
            .assemble(&AuditContext::new().attachment(labelled_png))
            .await;
        match &payload.segments()[1] {
            Segment::Image { mime_type, .. } => assert_eq!(mime_type, "image/jpeg"),
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn segments_serialise_as_tagged_variants() {
        let json = serde_json::to_value(Segment::image("image/jpeg", "QUJD")).unwrap();
        assert_eq!(json["kind"], "image");
        assert_eq!(json["mimeType"], "image/jpeg");
        let json = serde_json::to_value(Segment::text("hola")).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["value"], "hola");
    }
}
