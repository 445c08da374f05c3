//! Progress-callback trait for per-item conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through a batch. This is the side channel
//! that carries the human-readable per-file success and failure messages; the
//! CLI renders them next to its progress bar, a GUI would turn them into toasts.
//!
//! # Example
//!
//! ```rust
//! use avalon::{ConversionConfig, ConversionProgressCallback, ItemFailure};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for FailureCounter {
//!     fn on_item_error(&self, _index: usize, _total: usize, failure: &ItemFailure) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{failure}");
//!     }
//! }
//!
//! let counter = Arc::new(FailureCounter { failed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ItemFailure;
use std::sync::Arc;

/// Called by the orchestrator as it converts items.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is 1-based within the current batch; a
/// single-item conversion reports `index = 1, total = 1`.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first item of a "convert all" pass.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called right after an item moves to `Converting`.
    fn on_item_start(&self, index: usize, total: usize, source_name: &str) {
        let _ = (index, total, source_name);
    }

    /// Called when an item reaches `Completed`.
    ///
    /// # Arguments
    /// * `derived_name`: name the converted file will be saved under
    /// * `bytes`: size of the converted payload
    fn on_item_complete(
        &self,
        index: usize,
        total: usize,
        source_name: &str,
        derived_name: &str,
        bytes: usize,
    ) {
        let _ = (index, total, source_name, derived_name, bytes);
    }

    /// Called when an item reaches `Failed`.
    fn on_item_error(&self, index: usize, total: usize, failure: &ItemFailure) {
        let _ = (index, total, failure);
    }

    /// Called once after every selected item has been attempted.
    fn on_batch_complete(&self, total: usize, completed: usize) {
        let _ = (total, completed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
