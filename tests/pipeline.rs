//! Integration tests for bodyfat-lens.
//!
//! The model is replaced by an in-process [`InferenceBackend`] so these run
//! offline and deterministically. Timing-sensitive tests use tokio's paused
//! clock.

use bodyfat_lens::error::{INVALID_RESPONSE_MESSAGE, NETWORK_PAYLOAD_MESSAGE};
use bodyfat_lens::pipeline::compose::{self, OVERRIDE_LABEL};
use bodyfat_lens::reminder::REMINDER_KEY;
use bodyfat_lens::{
    acquire, normalize, AnalysisSession, Clock, FileStore, ImageSource, InferenceBackend,
    KeyValueStore, LensConfig, LensError, NormalizedImage, Provenance, ReminderScheduler,
    ReportView,
};
use futures::future::BoxFuture;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

const REPORT: &str = r#"```json
{
  "estimatedRange": "12-15%",
  "confidenceLevel": "High",
  "visualCues": ["visible upper abs", "defined deltoids"],
  "muscleDefinitionAnalysis": "Clear separation across the upper abdomen.",
  "healthTips": ["Keep protein intake high"],
  "disclaimer": "Visual estimate only; not a medical measurement."
}
```"#;

const NOT_APPLICABLE: &str = r#"{
  "estimatedRange": "N/A",
  "confidenceLevel": "Low",
  "visualCues": [],
  "muscleDefinitionAnalysis": "The photo is too dark to see the torso.",
  "healthTips": [],
  "disclaimer": "Visual estimate only.",
  "suggestions": ["Face a window or lamp", "Remove loose clothing"]
}"#;

/// Backend that answers every request the same way after `delay`.
struct Fixed {
    delay: Duration,
    reply: Result<&'static str, &'static str>,
    calls: AtomicUsize,
}

impl Fixed {
    fn ok(reply: &'static str) -> Arc<Self> {
        Self::after(Duration::ZERO, Ok(reply))
    }

    fn after(delay: Duration, reply: Result<&'static str, &'static str>) -> Arc<Self> {
        Arc::new(Self {
            delay,
            reply,
            calls: AtomicUsize::new(0),
        })
    }
}

impl InferenceBackend for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    fn complete<'a>(
        &'a self,
        image: &'a NormalizedImage,
        _prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, LensError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            assert_eq!(image.mime_type(), "image/jpeg");
            tokio::time::sleep(self.delay).await;
            self.reply
                .map(str::to_string)
                .map_err(|m| LensError::Transport { message: m.into() })
        })
    }
}

fn photo_file(dir: &std::path::Path, w: u32, h: u32) -> PathBuf {
    let img = RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x ^ y) % 256) as u8])
    });
    let path = dir.join("photo.png");
    DynamicImage::ImageRgb8(img).save(&path).unwrap();
    path
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows them on failure.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session(backend: Arc<Fixed>) -> AnalysisSession {
    init_tracing();
    AnalysisSession::with_font(LensConfig::default(), backend, None)
}

// ── Capture & normalise ──────────────────────────────────────────────────────

#[test]
fn large_photo_is_bounded_before_upload() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = photo_file(dir.path(), 2000, 1000);

    let raw = acquire(ImageSource::File(path)).unwrap().unwrap();
    let normalized = normalize(&raw, 1024, 70).unwrap();

    assert_eq!((normalized.width(), normalized.height()), (1024, 512));
    let back = image::load_from_memory_with_format(normalized.bytes(), ImageFormat::Jpeg).unwrap();
    assert_eq!((back.width(), back.height()), (1024, 512));
}

#[test]
fn dropped_png_bytes_are_accepted() {
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(300, 200))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();

    let raw = acquire(ImageSource::Dropped {
        bytes: png,
        mime: Some("image/png".into()),
    })
    .unwrap()
    .unwrap();
    let normalized = normalize(&raw, 1024, 70).unwrap();
    assert_eq!((normalized.width(), normalized.height()), (300, 200));
}

#[test]
fn text_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "not a photo").unwrap();
    assert!(acquire(ImageSource::File(path)).unwrap().is_none());
}

// ── Analysis ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fenced_report_produces_ai_card() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(Fixed::ok(REPORT));
    assert!(s.capture(ImageSource::File(photo_file(dir.path(), 640, 480))).unwrap());

    let report = s.analyze().await.unwrap().clone();
    assert_eq!(report.estimated_range, "12-15%");
    assert!(matches!(s.view(), Some(ReportView::Metrics(_))));

    let card = s.share_card().expect("card rendered after analysis");
    assert_eq!((card.width, card.height), (640, 480));
    assert_eq!(card.content.provenance, Provenance::Ai);
    assert_eq!(card.content.footnote(), "Confidence: High");

    let saved = card.save_to(dir.path()).unwrap();
    assert!(saved.ends_with("bodyfat-analysis.png"));
    let decoded = image::open(saved).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (640, 480));
}

#[tokio::test]
async fn not_applicable_report_shows_suggestions_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(Fixed::ok(NOT_APPLICABLE));
    s.capture(ImageSource::File(photo_file(dir.path(), 200, 200))).unwrap();
    s.analyze().await.unwrap();

    match s.view().unwrap() {
        ReportView::Unavailable {
            reason,
            suggestions,
        } => {
            assert!(reason.contains("too dark"));
            assert_eq!(suggestions.len(), 2);
        }
        ReportView::Metrics(_) => panic!("N/A report must not show metrics"),
    }
    assert!(s.share_card().is_none());
}

#[tokio::test]
async fn override_produces_self_reported_card() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(Fixed::ok(REPORT));
    s.capture(ImageSource::File(photo_file(dir.path(), 400, 600))).unwrap();
    s.analyze().await.unwrap();

    assert!(s.begin_override());
    assert!(s.commit_override("20%"));

    let card = s.share_card().unwrap();
    assert_eq!(card.content.value, "20%");
    assert_eq!(card.content.provenance, Provenance::UserOverride);
    assert_eq!(card.content.label(), OVERRIDE_LABEL);
    assert_eq!(card.content.value_color(), compose::OVERRIDE_VALUE_COLOR);
    assert!(!card.content.footnote().contains("Confidence"));
    assert_eq!(card.share_payload().text, "Self-Reported Body Fat: 20%.");
}

#[tokio::test]
async fn blank_override_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(Fixed::ok(REPORT));
    s.capture(ImageSource::File(photo_file(dir.path(), 100, 100))).unwrap();
    s.analyze().await.unwrap();
    let before = s.share_card().unwrap().generation;

    s.begin_override();
    assert!(!s.commit_override("   "));
    s.cancel_override();

    assert_eq!(s.display().unwrap().value(), "12-15%");
    assert_eq!(s.share_card().unwrap().generation, before);
}

#[tokio::test(start_paused = true)]
async fn slow_model_times_out_with_network_message() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Fixed::after(Duration::from_secs(600), Ok(REPORT));
    let mut s = session(Arc::clone(&backend));
    s.capture(ImageSource::File(photo_file(dir.path(), 64, 64))).unwrap();

    let err = s.analyze().await.unwrap_err();
    assert!(matches!(err, LensError::Timeout { secs: 120 }));
    assert_eq!(s.error_message(), Some(NETWORK_PAYLOAD_MESSAGE));
    assert!(s.result().is_none());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1, "no retries");
}

#[tokio::test]
async fn server_error_selects_network_message() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(Fixed::after(Duration::ZERO, Err("upstream returned 500")));
    s.capture(ImageSource::File(photo_file(dir.path(), 64, 64))).unwrap();
    s.analyze().await.unwrap_err();
    assert_eq!(s.error_message(), Some(NETWORK_PAYLOAD_MESSAGE));
}

#[tokio::test]
async fn prose_reply_is_invalid_response() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(Fixed::ok("Sorry, I can't assess this image."));
    s.capture(ImageSource::File(photo_file(dir.path(), 64, 64))).unwrap();
    let err = s.analyze().await.unwrap_err();
    assert!(matches!(err, LensError::InvalidResponse { .. }));
    assert_eq!(s.error_message(), Some(INVALID_RESPONSE_MESSAGE));
}

#[tokio::test]
async fn late_outcome_of_superseded_attempt_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(Fixed::ok(REPORT));
    s.capture(ImageSource::File(photo_file(dir.path(), 64, 64))).unwrap();

    let stale = s.begin_attempt().unwrap();
    let fresh = s.begin_attempt().unwrap();
    let fresh_outcome = fresh.run().await;
    let stale_outcome = tokio::spawn(stale.run()).await.unwrap();

    assert!(s.accept(fresh_outcome).unwrap());
    let generation = s.share_card().unwrap().generation;
    assert!(!s.accept(stale_outcome).unwrap());
    assert_eq!(s.share_card().unwrap().generation, generation);
}

#[tokio::test(start_paused = true)]
async fn branding_edits_recompose_once_after_quiet_period() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(Fixed::ok(REPORT));
    s.capture(ImageSource::File(photo_file(dir.path(), 120, 80))).unwrap();
    s.analyze().await.unwrap();
    let mut rx = s.composer().unwrap().subscribe();

    for text in ["I", "Ir", "Iro", "Iron", "Iron Gym"] {
        s.set_brand_text(text).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(s.share_card().unwrap().content.brand, "BodyFatAI Analysis");

    rx.changed().await.unwrap();
    assert_eq!(s.share_card().unwrap().content.brand, "Iron Gym");
    s.shutdown();
}

// ── Reminders ────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct TestClock(Arc<AtomicU64>);

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[test]
fn reminder_round_trips_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let clock = TestClock(Arc::new(AtomicU64::new(1_000)));
    let fourteen_days = Duration::from_secs(14 * 24 * 60 * 60);

    let scheduler = ReminderScheduler::with_clock(FileStore::new(&path), clock.clone());
    let due = scheduler.schedule_in(fourteen_days).unwrap();
    assert_eq!(due, 1_000 + fourteen_days.as_millis() as u64);

    let stored = FileStore::new(&path).get(REMINDER_KEY).unwrap();
    assert_eq!(stored, Some(due.to_string()));

    assert!(!scheduler.is_due().unwrap());
    clock.0.store(due + 1, Ordering::SeqCst);
    assert!(scheduler.is_due().unwrap());

    scheduler.clear().unwrap();
    assert!(!scheduler.is_due().unwrap());
}
