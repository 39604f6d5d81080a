//! One user's analysis session: photo → attempt → report → share card.
//!
//! The session owns the current photo, the last accepted report, the
//! override state and the share composer for that photo. It is the single
//! writer of all of them; nothing else mutates session state.
//!
//! ## Attempts
//!
//! Each call to [`AnalysisSession::begin_attempt`] increments an attempt
//! counter and hands out an [`Attempt`] carrying that ticket. The attempt
//! runs without borrowing the session, so a host can start it on another
//! task. When its outcome comes back, [`AnalysisSession::accept`] compares
//! the ticket with the current counter and drops the outcome if a newer
//! attempt (or a new photo) has superseded it.
//!
//! ```text
//!  capture ──▶ begin_attempt ──▶ Attempt::run ──▶ accept ──▶ report + card
//!                   ▲                                │
//!                   └──────── stale ticket: dropped ◀┘
//! ```

use crate::analysis::{AnalysisResult, ReportView};
use crate::config::LensConfig;
use crate::display::DisplayValue;
use crate::error::{CaptureError, LensError};
use crate::pipeline::capture::{self, ImageSource};
use crate::pipeline::compose::{self, CardContent};
use crate::pipeline::encode::{self, NormalizedImage};
use crate::pipeline::llm::{self, InferenceBackend};
use crate::progress::{NoopObserver, SharedObserver};
use crate::share::{ShareArtifact, ShareComposer};
use ab_glyph::FontArc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A single inference attempt, detached from the session.
pub struct Attempt {
    ticket: u64,
    image: NormalizedImage,
    backend: Arc<dyn InferenceBackend>,
    prompt: String,
    timeout: Duration,
}

/// The result of running an [`Attempt`].
#[derive(Debug)]
pub struct AttemptOutcome {
    pub ticket: u64,
    pub result: Result<AnalysisResult, LensError>,
}

impl Attempt {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Send the photo and wait for a report or the timeout.
    pub async fn run(self) -> AttemptOutcome {
        let result =
            llm::request_analysis(self.backend.as_ref(), &self.image, &self.prompt, self.timeout)
                .await;
        AttemptOutcome {
            ticket: self.ticket,
            result,
        }
    }
}

pub struct AnalysisSession {
    config: LensConfig,
    backend: Arc<dyn InferenceBackend>,
    observer: SharedObserver,
    font: Option<FontArc>,
    attempt: u64,
    photo: Option<NormalizedImage>,
    result: Option<AnalysisResult>,
    display: Option<DisplayValue>,
    error: Option<&'static str>,
    composer: Option<ShareComposer>,
}

impl AnalysisSession {
    /// Create a session. The card font is loaded here, once.
    pub fn new(config: LensConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        let font = compose::load_font(config.font_path.as_deref());
        if font.is_none() {
            warn!("No usable font found; share cards will have no text");
        }
        Self::with_font(config, backend, font)
    }

    /// Create a session with an already-loaded font (or none).
    pub fn with_font(
        config: LensConfig,
        backend: Arc<dyn InferenceBackend>,
        font: Option<FontArc>,
    ) -> Self {
        Self {
            config,
            backend,
            observer: Arc::new(NoopObserver),
            font,
            attempt: 0,
            photo: None,
            result: None,
            display: None,
            error: None,
            composer: None,
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &LensConfig {
        &self.config
    }

    // ── Capture ──────────────────────────────────────────────────────────

    /// Decode and normalise a new photo, replacing the current one.
    ///
    /// Returns `Ok(false)` when the input is not an image; the session is
    /// left untouched in that case. A new photo discards the previous
    /// report, override, card and any in-flight attempt.
    pub fn capture(&mut self, source: ImageSource) -> Result<bool, LensError> {
        let photo = match self.load(source) {
            Ok(Some(photo)) => photo,
            Ok(None) => return Ok(false),
            Err(e) => {
                self.error = Some(e.inline_message());
                return Err(e.into());
            }
        };
        self.observer
            .on_capture(photo.width(), photo.height(), photo.bytes().len());
        info!(
            "Captured {}x{} photo ({} bytes)",
            photo.width(),
            photo.height(),
            photo.bytes().len()
        );

        self.clear_report();
        self.attempt += 1;
        self.photo = Some(photo);
        Ok(true)
    }

    fn load(&self, source: ImageSource) -> Result<Option<NormalizedImage>, CaptureError> {
        let Some(raw) = capture::acquire(source)? else {
            return Ok(None);
        };
        encode::normalize(&raw, self.config.max_dimension, self.config.jpeg_quality).map(Some)
    }

    pub fn photo(&self) -> Option<&NormalizedImage> {
        self.photo.as_ref()
    }

    // ── Analysis ─────────────────────────────────────────────────────────

    /// Start a new attempt for the current photo, superseding any other.
    ///
    /// The previous report and card are discarded; the photo is kept.
    pub fn begin_attempt(&mut self) -> Result<Attempt, LensError> {
        let image = self
            .photo
            .clone()
            .ok_or_else(|| LensError::Internal("no photo captured".into()))?;
        self.clear_report();
        self.attempt += 1;
        self.observer.on_analysis_start(self.attempt);
        debug!("Attempt {} started", self.attempt);

        Ok(Attempt {
            ticket: self.attempt,
            image,
            backend: Arc::clone(&self.backend),
            prompt: llm::prompt_for(&self.config).to_string(),
            timeout: self.config.api_timeout(),
        })
    }

    /// Record an attempt's outcome.
    ///
    /// Returns `Ok(true)` when a report was accepted, `Ok(false)` when the
    /// outcome belongs to a superseded attempt and was dropped, and the
    /// attempt's error otherwise (its user message is kept in
    /// [`error_message`](Self::error_message)).
    pub fn accept(&mut self, outcome: AttemptOutcome) -> Result<bool, LensError> {
        if outcome.ticket != self.attempt {
            warn!(
                "Dropping outcome of attempt {} (current is {})",
                outcome.ticket, self.attempt
            );
            return Ok(false);
        }

        match outcome.result {
            Ok(result) => {
                self.observer
                    .on_analysis_complete(outcome.ticket, &result.estimated_range);
                info!(
                    "Attempt {} accepted: {} ({})",
                    outcome.ticket, result.estimated_range, result.confidence_level
                );
                self.install(result);
                Ok(true)
            }
            Err(e) => {
                let message = e.user_message();
                self.observer.on_analysis_error(outcome.ticket, message);
                warn!("Attempt {} failed: {}", outcome.ticket, e);
                self.error = Some(message);
                Err(e)
            }
        }
    }

    /// Run one attempt to completion and accept it.
    pub async fn analyze(&mut self) -> Result<&AnalysisResult, LensError> {
        let attempt = self.begin_attempt()?;
        let outcome = attempt.run().await;
        self.accept(outcome)?;
        self.result
            .as_ref()
            .ok_or_else(|| LensError::Internal("accepted report missing".into()))
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn view(&self) -> Option<ReportView<'_>> {
        self.result.as_ref().map(AnalysisResult::view)
    }

    /// User-facing text of the last failure, cleared by a new attempt.
    pub fn error_message(&self) -> Option<&'static str> {
        self.error
    }

    fn install(&mut self, result: AnalysisResult) {
        self.display = Some(DisplayValue::from_result(&result));
        let metrics = !result.is_not_applicable();
        self.result = Some(result);

        if metrics {
            self.render_card();
        } else if let Some(mut composer) = self.composer.take() {
            composer.shutdown();
        }
    }

    fn clear_report(&mut self) {
        self.result = None;
        self.display = None;
        self.error = None;
        if let Some(mut composer) = self.composer.take() {
            composer.shutdown();
        }
    }

    // ── Override ─────────────────────────────────────────────────────────

    pub fn display(&self) -> Option<&DisplayValue> {
        self.display.as_ref()
    }

    pub fn begin_override(&mut self) -> bool {
        self.display.as_mut().is_some_and(DisplayValue::begin_edit)
    }

    pub fn set_override_draft(&mut self, text: &str) {
        if let Some(display) = self.display.as_mut() {
            display.set_draft(text);
        }
    }

    /// Commit `text` as the shown value. Re-renders the card on success.
    pub fn commit_override(&mut self, text: &str) -> bool {
        let committed = self.display.as_mut().is_some_and(|d| d.commit(text));
        if committed {
            self.render_card();
        }
        committed
    }

    pub fn cancel_override(&mut self) {
        if let Some(display) = self.display.as_mut() {
            display.cancel();
        }
    }

    /// Drop the override and show the model's estimate again.
    pub fn reset_override(&mut self) {
        if let Some(display) = self.display.as_mut() {
            display.reset();
            self.render_card();
        }
    }

    // ── Share card ───────────────────────────────────────────────────────

    /// Overlay content for the current report, if it has metrics.
    pub fn card_content(&self) -> Option<CardContent> {
        let result = self.result.as_ref().filter(|r| !r.is_not_applicable())?;
        let display = self.display.as_ref()?;
        Some(CardContent {
            value: display.value().to_string(),
            provenance: display.provenance(),
            confidence: result.confidence_level.clone(),
            brand: self.config.brand_text.clone(),
        })
    }

    /// Change the branding text. The card is recomposed after the debounce
    /// window; call from within a tokio runtime.
    pub fn set_brand_text(&mut self, text: impl Into<String>) -> Result<(), LensError> {
        self.config.brand_text = text.into();
        let Some(content) = self.card_content() else {
            return Ok(());
        };
        self.composer_mut()?.submit(content)?;
        Ok(())
    }

    /// The newest published share card.
    pub fn share_card(&self) -> Option<Arc<ShareArtifact>> {
        self.composer.as_ref().and_then(ShareComposer::published)
    }

    pub fn composer(&self) -> Option<&ShareComposer> {
        self.composer.as_ref()
    }

    fn composer_mut(&mut self) -> Result<&mut ShareComposer, LensError> {
        if self.composer.is_none() {
            let photo = self
                .photo
                .clone()
                .ok_or_else(|| LensError::Internal("no photo captured".into()))?;
            let composer = ShareComposer::new(photo, self.font.clone(), self.config.debounce())
                .with_observer(Arc::clone(&self.observer));
            self.composer = Some(composer);
        }
        self.composer
            .as_mut()
            .ok_or_else(|| LensError::Internal("share composer missing".into()))
    }

    fn render_card(&mut self) {
        let Some(content) = self.card_content() else {
            return;
        };
        let rendered = self
            .composer_mut()
            .and_then(|composer| composer.render_now(content));
        if let Err(e) = rendered {
            warn!("Share card render failed: {}", e);
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Stop background work and supersede any in-flight attempt.
    pub fn shutdown(&mut self) {
        self.attempt += 1;
        if let Some(mut composer) = self.composer.take() {
            composer.shutdown();
        }
        debug!("Session shut down");
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
