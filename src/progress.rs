//! Progress-callback trait for audit pipeline events.
//!
//! Inject an [`Arc<dyn AuditProgressCallback>`] via
//! [`crate::config::AuditConfigBuilder::progress_callback`] to observe the
//! audit as it prepares evidence and waits on the backend. The CLI uses it to
//! drive a spinner; a host application could forward the events to its UI.
//!
//! # Example
//!
//! ```rust
//! use foodcontact_audit::{AuditConfig, AuditProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl AuditProgressCallback for PageCounter {
//!     fn on_attachment_prepared(&self, _index: usize, _name: &str, pages: usize) {
//!         self.pages.fetch_add(pages, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = AuditConfig::builder()
//!     .progress_callback(Arc::new(PageCounter { pages: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the audit pipeline at each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`; rasterisation
/// runs on blocking threads.
pub trait AuditProgressCallback: Send + Sync {
    /// Called once before any attachment is processed.
    fn on_audit_start(&self, attachments: usize) {
        let _ = attachments;
    }

    /// An attachment was turned into prompt segments.
    ///
    /// # Arguments
    /// * `index`: 1-based attachment position
    /// * `name` : attachment label
    /// * `pages`: image segments produced (1 for images, rendered pages for PDFs)
    fn on_attachment_prepared(&self, index: usize, name: &str, pages: usize) {
        let _ = (index, name, pages);
    }

    /// An attachment degraded to an advisory text segment.
    fn on_attachment_degraded(&self, index: usize, name: &str, reason: &str) {
        let _ = (index, name, reason);
    }

    /// Called just before the backend request is sent.
    ///
    /// `attempt` is 0 for the first call and increments on each retry.
    fn on_backend_call(&self, attempt: u32) {
        let _ = attempt;
    }

    /// Called once when the audit finishes, successfully or not.
    fn on_audit_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AuditProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AuditConfig`].
pub type ProgressCallback = Arc<dyn AuditProgressCallback>;
