//! # bodyfat-lens
//!
//! Estimate body-fat percentage from a photo using a hosted Vision Language
//! Model, and produce a shareable result card.
//!
//! The model does the estimating. This crate does everything around it:
//! getting a photo into a shape that uploads reliably, bounding the request
//! in time, turning the model's loosely formatted reply into a typed report,
//! letting the user correct the number, and painting a branded PNG card.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo (file / drop / camera)
//!  │
//!  ├─ 1. Capture    decode; ignore non-images
//!  ├─ 2. Normalise  bound longest side to 1024 px, JPEG q70
//!  ├─ 3. Infer      one VLM request raced against a 120 s timeout
//!  ├─ 4. Parse      strip ``` fences, deserialise the JSON report
//!  ├─ 5. Override   optional user-entered value
//!  └─ 6. Compose    gradient + text overlay → PNG share card
//! ```
//!
//! A separate [`ReminderScheduler`] stores when the next check-in photo is
//! due (two weeks after the last one, by default).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bodyfat_lens::{AnalysisSession, ImageSource, LensConfig, LlmBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let config = LensConfig::default();
//!     let backend = Arc::new(LlmBackend::from_config(&config)?);
//!     let mut session = AnalysisSession::new(config, backend);
//!
//!     session.capture(ImageSource::File("selfie.jpg".into()))?;
//!     let report = session.analyze().await?;
//!     println!("{} ({})", report.estimated_range, report.confidence_level);
//!
//!     if let Some(card) = session.share_card() {
//!         card.save_to(std::path::Path::new("."))?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bodyfat` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod config;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reminder;
pub mod session;
pub mod share;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analysis::{AnalysisResult, ReportView, NOT_APPLICABLE};
pub use config::{LensConfig, LensConfigBuilder};
pub use display::{DisplayValue, OverrideState, Provenance};
pub use error::{CaptureError, LensError};
pub use pipeline::capture::{acquire, capture_frame, Frame, FrameSource, ImageSource, RawImage};
pub use pipeline::compose::{CardContent, CardStyle};
pub use pipeline::encode::{normalize, NormalizedImage};
pub use pipeline::llm::{request_analysis, InferenceBackend, LlmBackend};
pub use progress::{AnalysisObserver, NoopObserver};
pub use reminder::{
    Clock, FileStore, KeyValueStore, MemoryStore, PushRegistrar, ReminderScheduler, SystemClock,
};
pub use session::{AnalysisSession, Attempt, AttemptOutcome};
pub use share::{ShareArtifact, ShareComposer, ShareKey, SharePayload};
