//! PDF rasterisation: Base64 PDF → bounded list of JPEG page images.
//!
//! ## Degrade, don't fail
//!
//! A PDF that cannot be decoded or loaded (corrupt, encrypted, not a PDF at
//! all) yields an empty page list instead of an error; the caller replaces it
//! with an advisory note and the audit goes on. Failures are also isolated per
//! page: if page 2 fails, pages 1 and 3 are still returned, each keeping its
//! real 1-based index.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a blocking C++ library with thread-local state. Rendering runs on
//! tokio's blocking pool so the async workers never stall.
//!
//! ## Engines
//!
//! [`PdfEngine`] is the seam between page selection and the renderer.
//! [`PdfiumEngine`] is the production implementation; tests plug in synthetic
//! documents.

use crate::config::AuditConfig;
use crate::context::strip_data_uri;
use crate::error::{AuditError, RasterError};
use crate::pipeline::encode::encode_jpeg;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest edge, in pixels, of any rendered page.
const MAX_RENDER_EDGE: i32 = 3000;

/// One rendered PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    /// 1-based page number in the source document.
    pub index: usize,
    /// Base64 JPEG (no data-URI prefix).
    pub image: String,
}

/// Result of rasterising one document.
#[derive(Debug, Clone, Default)]
pub struct Rasterized {
    /// Successfully rendered pages in ascending page order.
    pub pages: Vec<RasterPage>,
    /// Page count of the whole document.
    pub total_pages: usize,
    /// Pages that were attempted but failed.
    pub page_errors: Vec<RasterError>,
}

/// A loaded, paged document.
pub trait PagedDocument {
    fn page_count(&self) -> usize;

    /// Render the page at 0-based `index`, scaled by `scale`.
    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, String>;
}

/// Loads PDF bytes into a [`PagedDocument`].
///
/// The document only lives for the duration of `visit`, which lets engines
/// keep library handles and borrowed buffers on their own stack.
pub trait PdfEngine: Send + Sync {
    fn with_document(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&dyn PagedDocument),
    ) -> Result<(), RasterError>;
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// [`PdfEngine`] backed by the pdfium shared library.
///
/// Library lookup order: explicit path, `PDFIUM_LIB_PATH`, system library.
/// A path may name the library file or the directory holding it.
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    lib_path: Option<PathBuf>,
}

impl PdfiumEngine {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }

    fn bind(&self) -> Result<Pdfium, String> {
        let path = self
            .lib_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match path {
            Some(p) if p.is_dir() => {
                let dir = p.to_string_lossy().into_owned();
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
            }
            Some(p) => Pdfium::bind_to_library(p.to_string_lossy().into_owned()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| format!("{:?}", e))?;

        Ok(Pdfium::new(bindings))
    }

    /// Verify that pdfium can be bound, so a missing library is reported up
    /// front instead of silently degrading every PDF.
    pub fn ensure_available(&self) -> Result<(), AuditError> {
        self.bind().map(|_| ()).map_err(AuditError::PdfiumBindingFailed)
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl PagedDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, String> {
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|e| format!("{:?}", e))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_maximum_width(MAX_RENDER_EDGE)
            .set_maximum_height(MAX_RENDER_EDGE);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))?;

        Ok(bitmap.as_image())
    }
}

impl PdfEngine for PdfiumEngine {
    fn with_document(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&dyn PagedDocument),
    ) -> Result<(), RasterError> {
        let pdfium = self
            .bind()
            .map_err(|e| RasterError::LoadFailed(format!("pdfium unavailable: {}", e)))?;

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| RasterError::LoadFailed(format!("{:?}", e)))?;

        visit(&PdfiumDocument { document });
        Ok(())
    }
}

// ── Rasteriser ───────────────────────────────────────────────────────────

/// Turns a Base64 PDF into at most `max_pages` JPEG page images.
#[derive(Clone)]
pub struct DocumentRasterizer {
    engine: Arc<dyn PdfEngine>,
    max_pages: usize,
    scale: f32,
    jpeg_quality: u8,
}

impl DocumentRasterizer {
    pub fn new(engine: Arc<dyn PdfEngine>, max_pages: usize, scale: f32, jpeg_quality: u8) -> Self {
        Self {
            engine,
            max_pages,
            scale,
            jpeg_quality,
        }
    }

    /// Build from config: the injected engine, or pdfium.
    pub fn from_config(config: &AuditConfig) -> Self {
        let engine: Arc<dyn PdfEngine> = match config.pdf_engine {
            Some(ref engine) => Arc::clone(engine),
            None => Arc::new(PdfiumEngine::new(config.pdfium_lib_path.clone())),
        };
        Self::new(engine, config.max_pdf_pages, config.render_scale, config.jpeg_quality)
    }

    /// Rasterise the first pages of a PDF. Never fails: an unusable document
    /// yields an empty list.
    pub async fn rasterize(&self, pdf_base64: &str) -> Vec<RasterPage> {
        match self.try_rasterize(pdf_base64).await {
            Ok(r) => r.pages,
            Err(e) => {
                warn!("PDF rasterisation degraded to zero pages: {}", e);
                Vec::new()
            }
        }
    }

    /// Like [`rasterize`](Self::rasterize) but reports why a document failed
    /// and which pages were dropped.
    pub async fn try_rasterize(&self, pdf_base64: &str) -> Result<Rasterized, RasterError> {
        let bytes = decode_pdf(pdf_base64)?;
        let engine = Arc::clone(&self.engine);
        let (max_pages, scale, quality) = (self.max_pages, self.scale, self.jpeg_quality);

        tokio::task::spawn_blocking(move || {
            rasterize_blocking(engine.as_ref(), &bytes, max_pages, scale, quality)
        })
        .await
        .map_err(|e| RasterError::LoadFailed(format!("render task panicked: {}", e)))?
    }
}

/// Strip any data-URI prefix, decode, and check the `%PDF` magic.
fn decode_pdf(pdf_base64: &str) -> Result<Vec<u8>, RasterError> {
    let body: String = strip_data_uri(pdf_base64).split_whitespace().collect();
    let bytes = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| RasterError::Decode(e.to_string()))?;

    if !bytes.starts_with(b"%PDF") {
        return Err(RasterError::NotAPdf {
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(bytes)
}

/// Blocking implementation of page rendering.
fn rasterize_blocking(
    engine: &dyn PdfEngine,
    bytes: &[u8],
    max_pages: usize,
    scale: f32,
    jpeg_quality: u8,
) -> Result<Rasterized, RasterError> {
    let mut out = Rasterized::default();

    engine.with_document(bytes, &mut |doc: &dyn PagedDocument| {
        out.total_pages = doc.page_count();
        let limit = out.total_pages.min(max_pages);
        info!("PDF loaded: {} pages, rendering {}", out.total_pages, limit);

        for idx in 0..limit {
            let page = idx + 1;
            let rendered = doc
                .render_page(idx, scale)
                .map_err(|detail| RasterError::PageFailed { page, detail })
                .and_then(|img| {
                    encode_jpeg(&img, jpeg_quality).map_err(|e| RasterError::Encode {
                        page,
                        detail: e.to_string(),
                    })
                });

            match rendered {
                Ok(image) => {
                    debug!("Rendered page {} → {} bytes base64", page, image.len());
                    out.pages.push(RasterPage { index: page, image });
                }
                Err(e) => {
                    warn!("Skipping page {}: {}", page, e);
                    out.page_errors.push(e);
                }
            }
        }
    })?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct SyntheticDoc {
        pages: usize,
        broken: Option<usize>,
    }

    impl PagedDocument for SyntheticDoc {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, String> {
            if Some(index) == self.broken {
                return Err("synthetic failure".into());
            }
            let edge = (20.0 * scale) as u32;
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                edge,
                edge,
                Rgba([0, 0, 255, 255]),
            )))
        }
    }

    struct SyntheticEngine {
        pages: usize,
        broken: Option<usize>,
    }

    impl PdfEngine for SyntheticEngine {
        fn with_document(
            &self,
            _bytes: &[u8],
            visit: &mut dyn FnMut(&dyn PagedDocument),
        ) -> Result<(), RasterError> {
            visit(&SyntheticDoc {
                pages: self.pages,
                broken: self.broken,
            });
            Ok(())
        }
    }

    fn pdf_b64() -> String {
        STANDARD.encode(b"%PDF-1.7 synthetic")
    }

    fn rasterizer(pages: usize, broken: Option<usize>) -> DocumentRasterizer {
        DocumentRasterizer::new(Arc::new(SyntheticEngine { pages, broken }), 3, 1.5, 80)
    }

    #[tokio::test]
    async fn ten_page_document_is_capped_at_three() {
        let pages = rasterizer(10, None).rasterize(&pdf_b64()).await;
        let indices: Vec<usize> = pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn short_document_renders_every_page() {
        let pages = rasterizer(2, None).rasterize(&pdf_b64()).await;
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn failing_page_keeps_its_neighbours() {
        let r = rasterizer(5, Some(1)).try_rasterize(&pdf_b64()).await.unwrap();
        let indices: Vec<usize> = r.pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(r.total_pages, 5);
        assert_eq!(r.page_errors.len(), 1);
    }

    #[tokio::test]
    async fn data_uri_prefix_is_accepted() {
        let uri = format!("data:application/pdf;base64,{}", pdf_b64());
        assert_eq!(rasterizer(1, None).rasterize(&uri).await.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_payload_yields_no_pages() {
        let r = rasterizer(4, None);
        assert!(r.rasterize("@@not-base64@@").await.is_empty());
        assert!(r.rasterize(&STANDARD.encode(b"GIF89a....")).await.is_empty());

        let err = r
            .try_rasterize(&STANDARD.encode(b"PK\x03\x04"))
            .await
            .unwrap_err();
        assert!(matches!(err, RasterError::NotAPdf { .. }));
    }

    #[test]
    fn rendered_pages_are_jpeg() {
        let engine = SyntheticEngine {
            pages: 1,
            broken: None,
        };
        let r = rasterize_blocking(&engine, b"%PDF", 3, 1.0, 80).unwrap();
        let bytes = STANDARD.decode(&r.pages[0].image).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
