//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through a batch. The CLI renders them as
//! an indicatif progress bar; the HTTP API leaves them unset.
//!
//! # Example
//!
//! ```rust
//! use edgequake_img2json::{BatchProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, filename: &str, entries: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}/{total} {filename}: {entries} entries");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch orchestrator as it processes each file.
///
/// Files are processed strictly in order, one at a time, so events arrive
/// in a fixed sequence: `on_batch_start`, then for each file
/// `on_file_start` followed by exactly one of `on_file_complete` /
/// `on_file_error`, then `on_batch_complete`. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before the extractor runs on a file.
    ///
    /// `index` is 1-based.
    fn on_file_start(&self, index: usize, total_files: usize, filename: &str) {
        let _ = (index, total_files, filename);
    }

    /// Called when a file produced a result (parsed or invalid-json).
    ///
    /// `entries` is the number of batch entries the file contributed.
    fn on_file_complete(&self, index: usize, total_files: usize, filename: &str, entries: usize) {
        let _ = (index, total_files, filename, entries);
    }

    /// Called when extraction raised an error for a file.
    fn on_file_error(&self, index: usize, total_files: usize, filename: &str, error: &str) {
        let _ = (index, total_files, filename, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_file_start(1, 2, "a.png");
        cb.on_file_complete(1, 2, "a.png", 3);
        cb.on_file_start(2, 2, "b.png");
        cb.on_file_error(2, 2, "b.png", "quota exceeded");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
        cb.on_file_complete(1, 1, "scan.jpg", 1);
    }
}
