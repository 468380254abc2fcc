//! Progress-callback trait for per-image extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through an archive.
//!
//! The library itself only logs; how progress is shown (terminal bar, web
//! socket, database row) is the host application's business.
//!
//! # Example
//!
//! ```rust
//! use edgequake_news2csv::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ArticleCounter {
//!     articles: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for ArticleCounter {
//!     fn on_image_complete(&self, _index: usize, _total: usize, _name: &str, articles: usize) {
//!         self.articles.fetch_add(articles, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(ArticleCounter { articles: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each image of an archive.
///
/// Images are processed one after another, so calls never overlap for a
/// single run. Implementations must still be `Send + Sync` because the
/// config (and the callback with it) may be shared across runs on different
/// tasks. All methods default to no-ops.
///
/// `index` is 1-based and counts qualifying images only.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the archive is opened and the table is ready.
    fn on_archive_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called just before an image is sent to the inference service.
    fn on_image_start(&self, index: usize, total_images: usize, name: &str) {
        let _ = (index, total_images, name);
    }

    /// Called after an image's articles were appended to the table.
    fn on_image_complete(&self, index: usize, total_images: usize, name: &str, articles: usize) {
        let _ = (index, total_images, name, articles);
    }

    /// Called when an image is skipped because of an [`crate::error::ImageError`].
    fn on_image_error(&self, index: usize, total_images: usize, name: &str, error: &str) {
        let _ = (index, total_images, name, error);
    }

    /// Called once after every image has been attempted.
    fn on_archive_complete(&self, total_images: usize, succeeded: usize, articles: usize) {
        let _ = (total_images, succeeded, articles);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
