//! Lifecycle observer for capture, analysis and share-card events.
//!
//! Inject an [`Arc<dyn AnalysisObserver>`] into an
//! [`AnalysisSession`](crate::session::AnalysisSession) to hear about each
//! step as it happens. The CLI uses this to drive its spinner; a GUI host
//! would forward the events to its own widgets.
//!
//! # Example
//!
//! ```rust
//! use bodyfat_lens::AnalysisObserver;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Failures(AtomicUsize);
//!
//! impl AnalysisObserver for Failures {
//!     fn on_analysis_error(&self, _attempt: u64, message: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("analysis failed: {message}");
//!     }
//! }
//!
//! let observer: Arc<dyn AnalysisObserver> = Arc::new(Failures(AtomicUsize::new(0)));
//! observer.on_analysis_start(1);
//! ```

use std::sync::Arc;

/// Receives session events. All methods default to no-ops.
///
/// Must be `Send + Sync`: share cards are composed on a background task.
pub trait AnalysisObserver: Send + Sync {
    /// A photo was decoded and normalised.
    ///
    /// # Arguments
    /// * `width`, `height`: normalised size in pixels
    /// * `bytes`: JPEG payload size
    fn on_capture(&self, width: u32, height: u32, bytes: usize) {
        let _ = (width, height, bytes);
    }

    /// An inference request is about to be sent.
    fn on_analysis_start(&self, attempt: u64) {
        let _ = attempt;
    }

    /// The attempt produced a report and it was accepted.
    ///
    /// `estimate` is the model's range, or `"N/A"`.
    fn on_analysis_complete(&self, attempt: u64, estimate: &str) {
        let _ = (attempt, estimate);
    }

    /// The attempt failed. `message` is the user-facing text.
    fn on_analysis_error(&self, attempt: u64, message: &str) {
        let _ = (attempt, message);
    }

    /// A share card was published.
    fn on_share_rendered(&self, generation: u64, png_len: usize) {
        let _ = (generation, png_len);
    }
}

/// Observer that ignores everything. Used when none is configured.
pub struct NoopObserver;

impl AnalysisObserver for NoopObserver {}

pub type SharedObserver = Arc<dyn AnalysisObserver>;
