//! Share-card production: immediate renders, debounced recomposition and
//! export.
//!
//! A [`ShareComposer`] is bound to one normalised photo. The photo is
//! decoded once, on first use, and reused for every card after that.
//!
//! ## Ordering
//!
//! Every render request takes a ticket from a monotonically increasing
//! generation counter *when it is requested*. A finished card is published
//! only if its ticket is newer than the card already published, so a slow
//! render can never overwrite a newer one.
//!
//! ## Debouncing
//!
//! Branding edits arrive keystroke by keystroke. [`ShareComposer::submit`]
//! queues them on an `mpsc` channel; a worker task waits for a quiet period
//! (500 ms by default) after the last request and composes only the newest.
//! [`ShareComposer::shutdown`] cancels the pending timer and any queued
//! request.

use crate::display::Provenance;
use crate::error::LensError;
use crate::pipeline::compose::{self, CardContent, CardStyle};
use crate::pipeline::encode::NormalizedImage;
use crate::progress::{NoopObserver, SharedObserver};
use ab_glyph::FontArc;
use image::RgbaImage;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// File name used when a card is saved or shared.
pub const SHARE_FILE_NAME: &str = "bodyfat-analysis.png";
pub const SHARE_TITLE: &str = "My BodyFatAI Analysis";

/// What a card depends on: the photo and the overlay content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShareKey {
    pub source_id: u64,
    pub content: CardContent,
}

/// A finished, encoded share card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareArtifact {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Identity of the photo the card was drawn on.
    pub source_id: u64,
    pub content: CardContent,
    pub generation: u64,
}

/// Metadata handed to a platform share sheet alongside the PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePayload {
    pub title: String,
    pub text: String,
    pub file_name: &'static str,
}

impl ShareArtifact {
    pub fn key(&self) -> ShareKey {
        ShareKey {
            source_id: self.source_id,
            content: self.content.clone(),
        }
    }

    pub fn share_payload(&self) -> SharePayload {
        let text = match self.content.provenance {
            Provenance::Ai => format!("Estimated Body Fat: {}. Analyzed by AI.", self.content.value),
            Provenance::UserOverride => format!("Self-Reported Body Fat: {}.", self.content.value),
        };
        SharePayload {
            title: SHARE_TITLE.to_string(),
            text,
            file_name: SHARE_FILE_NAME,
        }
    }

    /// Write the card into `dir` as [`SHARE_FILE_NAME`].
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, LensError> {
        let path = dir.join(SHARE_FILE_NAME);
        std::fs::write(&path, &self.png).map_err(|source| LensError::OutputWriteFailed {
            path: path.clone(),
            source,
        })?;
        info!("Saved share card to {}", path.display());
        Ok(path)
    }
}

/// Renders share cards for one photo.
pub struct ShareComposer {
    inner: Arc<Inner>,
    debounce: Duration,
    queue: Option<mpsc::UnboundedSender<Pending>>,
    worker: Option<JoinHandle<()>>,
}

struct Inner {
    source: NormalizedImage,
    decoded: OnceCell<RgbaImage>,
    font: Option<FontArc>,
    style: CardStyle,
    next_generation: AtomicU64,
    published: watch::Sender<Option<Arc<ShareArtifact>>>,
    observer: SharedObserver,
}

struct Pending {
    ticket: u64,
    content: CardContent,
}

impl ShareComposer {
    pub fn new(source: NormalizedImage, font: Option<FontArc>, debounce: Duration) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                source,
                decoded: OnceCell::new(),
                font,
                style: CardStyle::default(),
                next_generation: AtomicU64::new(0),
                published,
                observer: Arc::new(NoopObserver),
            }),
            debounce,
            queue: None,
            worker: None,
        }
    }

    /// Replace the card proportions. Must be called before the first render.
    pub fn with_style(mut self, style: CardStyle) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.style = style;
        }
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.observer = observer;
        }
        self
    }

    pub fn source_id(&self) -> u64 {
        self.inner.source.identity()
    }

    /// Compose a card right away, bypassing the debounce window.
    ///
    /// The returned artifact is also published unless a newer one already was.
    pub fn render_now(&self, content: CardContent) -> Result<Arc<ShareArtifact>, LensError> {
        let ticket = self.inner.take_ticket();
        let artifact = Arc::new(self.inner.compose(ticket, content)?);
        self.inner.publish(Arc::clone(&artifact));
        Ok(artifact)
    }

    /// Queue a recomposition that runs after the debounce window closes.
    ///
    /// Must be called from within a tokio runtime; the worker task is
    /// started on first use.
    pub fn submit(&mut self, content: CardContent) -> Result<u64, LensError> {
        let ticket = self.inner.take_ticket();
        let queue = self.ensure_worker()?;
        queue
            .send(Pending { ticket, content })
            .map_err(|_| LensError::Internal("share worker has stopped".into()))?;
        debug!("Queued share card generation {}", ticket);
        Ok(ticket)
    }

    /// The newest published card, if any.
    pub fn published(&self) -> Option<Arc<ShareArtifact>> {
        self.inner.published.borrow().clone()
    }

    /// Watch published cards as they change.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ShareArtifact>>> {
        self.inner.published.subscribe()
    }

    /// Stop the debounce worker, dropping any pending request.
    pub fn shutdown(&mut self) {
        self.queue = None;
        if let Some(worker) = self.worker.take() {
            worker.abort();
            debug!("Share worker stopped");
        }
    }

    fn ensure_worker(&mut self) -> Result<&mpsc::UnboundedSender<Pending>, LensError> {
        if self.queue.is_none() {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| LensError::Internal(format!("no async runtime: {e}")))?;
            let (tx, rx) = mpsc::unbounded_channel();
            self.worker = Some(runtime.spawn(debounce_loop(
                Arc::clone(&self.inner),
                rx,
                self.debounce,
            )));
            self.queue = Some(tx);
        }
        self.queue
            .as_ref()
            .ok_or_else(|| LensError::Internal("share queue missing".into()))
    }
}

impl Drop for ShareComposer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn take_ticket(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn base(&self) -> Result<&RgbaImage, LensError> {
        self.decoded.get_or_try_init(|| {
            debug!("Decoding share source {:016x}", self.source.identity());
            Ok(self.source.decode()?.to_rgba8())
        })
    }

    fn compose(&self, ticket: u64, content: CardContent) -> Result<ShareArtifact, LensError> {
        let base = self.base()?;
        let card = compose::composite(base, &content, self.font.as_ref(), &self.style)?;
        let png = compose::encode_png(&card)?;
        Ok(ShareArtifact {
            png,
            width: card.width(),
            height: card.height(),
            source_id: self.source.identity(),
            content,
            generation: ticket,
        })
    }

    /// `true` when the published card already shows `content` on this photo.
    fn is_published(&self, ticket: u64, content: &CardContent) -> bool {
        let key = ShareKey {
            source_id: self.source.identity(),
            content: content.clone(),
        };
        self.published
            .borrow()
            .as_ref()
            .is_some_and(|card| card.generation < ticket && card.key() == key)
    }

    /// Publish `artifact` if it is newer than the current card.
    fn publish(&self, artifact: Arc<ShareArtifact>) -> bool {
        let generation = artifact.generation;
        let png_len = artifact.png.len();
        let accepted = self.published.send_if_modified(|current| {
            if current.as_ref().is_some_and(|c| c.generation >= generation) {
                return false;
            }
            *current = Some(artifact);
            true
        });
        if accepted {
            self.observer.on_share_rendered(generation, png_len);
        } else {
            debug!("Discarded stale share card generation {}", generation);
        }
        accepted
    }
}

async fn debounce_loop(
    inner: Arc<Inner>,
    mut rx: mpsc::UnboundedReceiver<Pending>,
    quiet: Duration,
) {
    while let Some(mut pending) = rx.recv().await {
        // Restart the quiet window on every newer request.
        let closed = loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(newer) => pending = newer,
                    None => break true,
                },
                _ = sleep(quiet) => break false,
            }
        };
        if closed {
            debug!("Share queue closed; dropping generation {}", pending.ticket);
            return;
        }

        if inner.is_published(pending.ticket, &pending.content) {
            debug!("Share card unchanged; skipping generation {}", pending.ticket);
            continue;
        }

        match inner.compose(pending.ticket, pending.content) {
            Ok(artifact) => {
                inner.publish(Arc::new(artifact));
            }
            Err(e) => warn!("Share card generation {} failed: {}", pending.ticket, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::capture::{CaptureOrigin, RawImage};
    use crate::pipeline::encode::normalize;
    use crate::progress::AnalysisObserver;
    use image::{DynamicImage, Rgba};
    use std::sync::atomic::AtomicUsize;

    fn photo() -> NormalizedImage {
        let raw = RawImage {
            image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 48, Rgba([180, 160, 140, 255]))),
            origin: CaptureOrigin::File,
        };
        normalize(&raw, 1024, 70).unwrap()
    }

    fn content(brand: &str) -> CardContent {
        CardContent {
            value: "12-15%".into(),
            provenance: Provenance::Ai,
            confidence: "High".into(),
            brand: brand.into(),
        }
    }

    #[derive(Default)]
    struct Renders(AtomicUsize);

    impl AnalysisObserver for Renders {
        fn on_share_rendered(&self, _generation: u64, _png_len: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn render_now_publishes_png_of_source_size() {
        let composer = ShareComposer::new(photo(), None, Duration::from_millis(500));
        let card = composer.render_now(content("Gym")).unwrap();
        assert_eq!((card.width, card.height), (64, 48));
        assert!(card.png.starts_with(&[0x89, b'P', b'N', b'G']));
        assert_eq!(composer.published().unwrap().generation, card.generation);
        assert_eq!(card.source_id, composer.source_id());
    }

    #[test]
    fn stale_render_does_not_replace_newer() {
        let composer = ShareComposer::new(photo(), None, Duration::from_millis(500));
        let older = composer.inner.take_ticket();
        let newer = composer.inner.take_ticket();
        let newer_card = composer.inner.compose(newer, content("new")).unwrap();
        let older_card = composer.inner.compose(older, content("old")).unwrap();

        assert!(composer.inner.publish(Arc::new(newer_card)));
        assert!(!composer.inner.publish(Arc::new(older_card)));
        assert_eq!(composer.published().unwrap().content.brand, "new");
    }

    #[test]
    fn source_is_decoded_once() {
        let composer = ShareComposer::new(photo(), None, Duration::from_millis(500));
        composer.render_now(content("a")).unwrap();
        let first = composer.inner.decoded.get().unwrap() as *const RgbaImage;
        composer.render_now(content("b")).unwrap();
        let second = composer.inner.decoded.get().unwrap() as *const RgbaImage;
        assert_eq!(first, second);
    }

    #[test]
    fn share_payload_reflects_provenance() {
        let composer = ShareComposer::new(photo(), None, Duration::from_millis(500));
        let ai = composer.render_now(content("x")).unwrap();
        assert_eq!(ai.share_payload().text, "Estimated Body Fat: 12-15%. Analyzed by AI.");
        assert_eq!(ai.share_payload().title, SHARE_TITLE);

        let mut adjusted = content("x");
        adjusted.value = "20%".into();
        adjusted.provenance = Provenance::UserOverride;
        let user = composer.render_now(adjusted).unwrap();
        assert_eq!(user.share_payload().text, "Self-Reported Body Fat: 20%.");
    }

    #[test]
    fn save_writes_named_png() {
        let dir = tempfile::tempdir().unwrap();
        let composer = ShareComposer::new(photo(), None, Duration::from_millis(500));
        let card = composer.render_now(content("x")).unwrap();
        let path = card.save_to(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), SHARE_FILE_NAME);
        assert_eq!(std::fs::read(path).unwrap(), card.png);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_renders_once() {
        let renders = Arc::new(Renders::default());
        let mut composer = ShareComposer::new(photo(), None, Duration::from_millis(500))
            .with_observer(renders.clone());
        let mut rx = composer.subscribe();

        composer.submit(content("B")).unwrap();
        sleep(Duration::from_millis(100)).await;
        composer.submit(content("Bo")).unwrap();
        sleep(Duration::from_millis(100)).await;
        let last = composer.submit(content("Bod")).unwrap();

        rx.changed().await.unwrap();
        let card = composer.published().unwrap();
        assert_eq!(card.content.brand, "Bod");
        assert_eq!(card.generation, last);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(renders.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_content_is_not_recomposed() {
        let renders = Arc::new(Renders::default());
        let mut composer = ShareComposer::new(photo(), None, Duration::from_millis(500))
            .with_observer(renders.clone());
        let first = composer.render_now(content("Gym")).unwrap();
        composer.submit(content("Gym")).unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(renders.0.load(Ordering::SeqCst), 1);
        assert_eq!(composer.published().unwrap().generation, first.generation);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_renders_before_quiet_period() {
        let mut composer = ShareComposer::new(photo(), None, Duration::from_millis(500));
        composer.submit(content("B")).unwrap();
        sleep(Duration::from_millis(400)).await;
        assert!(composer.published().is_none());
        sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(composer.published().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_render() {
        let mut composer = ShareComposer::new(photo(), None, Duration::from_millis(500));
        composer.submit(content("B")).unwrap();
        composer.shutdown();
        sleep(Duration::from_secs(1)).await;
        assert!(composer.published().is_none());
    }

    #[test]
    fn submit_outside_runtime_is_an_error() {
        let mut composer = ShareComposer::new(photo(), None, Duration::from_millis(500));
        assert!(matches!(composer.submit(content("x")), Err(LensError::Internal(_))));
    }
}
