//! Image encoding: `DynamicImage` → base64 JPEG.
//!
//! Rendered pages and re-encoded attachments leave the pipeline as JPEG at a
//! fixed quality. Pages are scanned documents read for labels, stamps and
//! tables; JPEG at ~80 keeps them legible while a three-page datasheet stays
//! a few hundred kilobytes. JPEG has no alpha channel, so images are
//! flattened to RGB first.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// MIME types every vision backend accepts verbatim.
pub const FORWARDABLE_IMAGE_MIMES: [&str; 4] = ["image/png", "image/jpeg", "image/webp", "image/gif"];

/// Encode an image as base64 JPEG at `quality` (1–100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<String, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        rgb.width(),
        rgb.height(),
        b64.len()
    );
    Ok(b64)
}

/// `true` when an image can be forwarded without re-encoding.
pub fn is_forwardable(mime_type: &str) -> bool {
    FORWARDABLE_IMAGE_MIMES
        .iter()
        .any(|m| m.eq_ignore_ascii_case(mime_type))
}

/// Decode a base64 image body far enough to identify its format, and return
/// the MIME type its magic bytes announce.
pub fn sniff_image_mime(base64_body: &str) -> Result<&'static str, String> {
    let bytes = STANDARD
        .decode(base64_body)
        .map_err(|e| format!("invalid base64: {e}"))?;
    image::guess_format(&bytes)
        .map(|format| format.to_mime_type())
        .map_err(|e| format!("unrecognised image data: {e}"))
}

/// Decode a base64 image of any format the `image` crate reads and
/// re-encode it as JPEG.
///
/// Used for image attachments whose type the backends reject (BMP, TIFF, …).
pub fn reencode_as_jpeg(base64_body: &str, quality: u8) -> Result<String, String> {
    let bytes = STANDARD
        .decode(base64_body)
        .map_err(|e| format!("invalid base64: {e}"))?;
    let img = image::load_from_memory(&bytes).map_err(|e| format!("undecodable image: {e}"))?;
    encode_jpeg(&img, quality).map_err(|e| format!("JPEG encoding failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_small_image_as_jpeg() {
        let b64 = encode_jpeg(&red_square(), 80).expect("encode should succeed");
        let decoded = STANDARD.decode(&b64).expect("valid base64");
        assert_eq!(&decoded[..2], &[0xFF, 0xD8], "JPEG SOI marker");
    }

    #[test]
    fn bmp_is_reencoded_to_jpeg() {
        let mut bmp = Vec::new();
        red_square()
            .write_to(&mut Cursor::new(&mut bmp), ImageFormat::Bmp)
            .unwrap();
        let jpeg = reencode_as_jpeg(&STANDARD.encode(&bmp), 80).unwrap();
        assert_eq!(
            image::guess_format(&STANDARD.decode(jpeg).unwrap()).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn garbage_cannot_be_reencoded() {
        assert!(reencode_as_jpeg(&STANDARD.encode(b"not an image"), 80).is_err());
        assert!(reencode_as_jpeg("***", 80).is_err());
    }

    #[test]
    fn sniff_reads_magic_bytes_not_the_label() {
        let mut png = Vec::new();
        red_square()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        assert_eq!(sniff_image_mime(&STANDARD.encode(&png)).unwrap(), "image/png");
        assert!(sniff_image_mime(&STANDARD.encode(b"not an image")).is_err());
        assert!(sniff_image_mime("@@@ not base64 @@@").is_err());
    }

    #[test]
    fn forwardable_types() {
        assert!(is_forwardable("image/png"));
        assert!(is_forwardable("IMAGE/JPEG"));
        assert!(!is_forwardable("image/tiff"));
    }
}
