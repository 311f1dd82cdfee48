//! Pipeline stages for a food-contact audit.
//!
//! Each submodule implements one step, so stages can be tested and swapped
//! (rendering engine, backend transport) independently.
//!
//! ## Data Flow
//!
//! ```text
//! attachment ──▶ render ──▶ encode ──▶ assemble ──▶ backend ──▶ response
//! (path/bytes)   (pdfium)   (JPEG)     (segments)   (model)     (cleanup)
//! ```
//!
//! 1. [`attachment`]: read files, detect MIME type, Base64-encode
//! 2. [`render`]: rasterise the first pages of PDF attachments; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]: JPEG-encode pages and unsupported image formats
//! 4. [`assemble`]: build the ordered text/image prompt payload
//! 5. [`backend`] / [`openai`]: the generative call; the only network I/O
//! 6. [`response`]: strip fences and invisible characters before parsing

pub mod assemble;
pub mod attachment;
pub mod backend;
pub mod encode;
pub mod openai;
pub mod render;
pub mod response;
