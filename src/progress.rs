//! Progress-callback trait for batch conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events while [`crate::convert_batch`] works through its files.
//!
//! # Example
//!
//! ```rust
//! use edgequake_topdf::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, name: &str, output_bytes: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {} -> {} bytes", index + 1, total, name, output_bytes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch converter as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Files run concurrently (up to `ConversionConfig::concurrency`), so
/// `on_file_start`, `on_file_complete` and `on_file_error` may be called
/// from different threads and in any order. Protect shared mutable state
/// with `Mutex` or atomics.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any file is converted.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a file's conversion begins.
    ///
    /// # Arguments
    /// * `index`: 0-indexed position of the file in the batch
    /// * `total`: number of files in the batch
    /// * `name`: display name of the input
    fn on_file_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a file converted successfully.
    ///
    /// `output_bytes` is the size of the written PDF.
    fn on_file_complete(&self, index: usize, total: usize, name: &str, output_bytes: u64) {
        let _ = (index, total, name, output_bytes);
    }

    /// Called when a file failed to convert.
    fn on_file_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        batch_total: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total: usize) {
            self.batch_total.store(total, Ordering::SeqCst);
        }

        fn on_file_start(&self, _index: usize, _total: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _index: usize, _total: usize, _name: &str, _bytes: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _index: usize, _total: usize, _name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, succeeded: usize) {
            self.succeeded.store(succeeded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_file_start(0, 2, "a.docx");
        cb.on_file_complete(0, 2, "a.docx", 1024);
        cb.on_file_error(1, 2, "b.txt", "Unsupported file type");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_batch_start(3);
        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 3);

        tracker.on_file_start(0, 3, "a.docx");
        tracker.on_file_complete(0, 3, "a.docx", 900);
        tracker.on_file_start(1, 3, "b.png");
        tracker.on_file_complete(1, 3, "b.png", 4000);
        tracker.on_file_start(2, 3, "c.xlsx");
        tracker.on_file_error(2, 3, "c.xlsx", "first worksheet is empty");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_batch_complete(3, 2);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ConversionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
        cb.on_file_start(0, 1, "x.jpg");
        cb.on_file_complete(0, 1, "x.jpg", 512);
    }
}
