//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::WatermarkConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through each file.
//!
//! # Example
//!
//! ```rust
//! use mdpdf_watermark::{BatchProgressCallback, WatermarkConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, path: &Path, output: &Path) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{index}/{total}] {} -> {}", path.display(), output.display());
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//!
//! let config = WatermarkConfig::builder()
//!     .progress_callback(cb as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::FileKind;
use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as it processes each file.
///
/// Files are processed sequentially, so calls never overlap within one run.
/// The trait is still `Send + Sync` because the run itself may execute on any
/// tokio worker. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery, before the first file.
    ///
    /// # Arguments
    /// * `total` — number of files that will be processed
    /// * `kind`  — document kind of the batch (after any mode fallback)
    fn on_batch_start(&self, total: usize, kind: FileKind) {
        let _ = (total, kind);
    }

    /// Called just before a file is handed to the external tools.
    ///
    /// `index` is 1-based.
    fn on_file_start(&self, index: usize, total: usize, path: &Path) {
        let _ = (index, total, path);
    }

    /// Called when a file produced its final output.
    ///
    /// `output` reflects any rename by title.
    fn on_file_complete(&self, index: usize, total: usize, path: &Path, output: &Path) {
        let _ = (index, total, path, output);
    }

    /// Called when a file failed; `error` is human-readable.
    fn on_file_error(&self, index: usize, total: usize, path: &Path, error: &str) {
        let _ = (index, total, path, error);
    }

    /// Called once after the loop ends (normally or by cancellation).
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::WatermarkConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
