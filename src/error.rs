//! Error types for the bodyfat-lens library.
//!
//! Two error types reflect two failure surfaces:
//!
//! * [`CaptureError`]: acquiring or normalising the photo failed (unreadable
//!   file, camera unavailable, no drawing surface). Shown inline next to the
//!   capture control; the user may simply try another photo.
//!
//! * [`LensError`]: everything that ends an analysis attempt: capture
//!   failures, transport failures and timeouts from the inference boundary,
//!   malformed model output, storage and configuration problems.
//!
//! Every error is terminal for the current attempt. Nothing is retried
//! automatically and no partial result is ever surfaced.
//!
//! A response whose estimate is `"N/A"` is *not* an error; see
//! [`crate::analysis::ReportView::Unavailable`].

use std::path::PathBuf;
use thiserror::Error;

/// Message shown when the request probably failed because of payload size
/// or an unstable connection.
pub const NETWORK_PAYLOAD_MESSAGE: &str =
    "The photo may be too large or your network connection is unstable. \
Please try a smaller photo or check your connection.";

/// Generic analysis failure message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to analyze image. Please try again.";

/// Message shown when the model answered with something that is not a report.
pub const INVALID_RESPONSE_MESSAGE: &str =
    "The AI returned an invalid response. Please try again.";

/// Inline message for a camera that cannot be opened.
pub const CAMERA_MESSAGE: &str = "Could not access camera. Please check permissions.";

/// Transport error fragments that point at payload size or connectivity.
const NETWORK_HINTS: &[&str] = &[
    "500",
    "502",
    "503",
    "504",
    "413",
    "xhr",
    "payload",
    "network",
    "too large",
    "connection",
    "timed out",
];

/// Failures while acquiring, decoding or re-encoding the photo.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The file could not be opened or read.
    #[error("Could not read image '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes claimed to be an image but did not decode.
    #[error("Image could not be decoded: {detail}")]
    DecodeFailed { detail: String },

    /// Live capture could not be started (permission denied, no device).
    #[error("Could not access camera: {detail}")]
    CameraUnavailable { detail: String },

    /// A raster surface of the requested size could not be created.
    #[error("No drawing surface available for a {width}x{height} image")]
    SurfaceUnavailable { width: u32, height: u32 },

    /// JPEG/PNG encoding failed.
    #[error("Image encoding failed: {detail}")]
    EncodeFailed { detail: String },
}

impl CaptureError {
    /// Short text suitable for display next to the capture control.
    pub fn inline_message(&self) -> &'static str {
        match self {
            CaptureError::CameraUnavailable { .. } => CAMERA_MESSAGE,
            CaptureError::Unreadable { .. } | CaptureError::DecodeFailed { .. } => {
                "This file could not be read as an image."
            }
            CaptureError::SurfaceUnavailable { .. } | CaptureError::EncodeFailed { .. } => {
                "This photo could not be processed on this device."
            }
        }
    }
}

/// All errors that end an analysis attempt or a library operation.
#[derive(Debug, Error)]
pub enum LensError {
    // ── Capture ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Capture(#[from] CaptureError),

    // ── Inference boundary ────────────────────────────────────────────────
    /// The request did not settle before the timeout.
    #[error("Analysis timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider or the connection reported an error.
    #[error("Inference request failed: {message}")]
    Transport { message: String },

    /// The provider answered with no text at all.
    #[error("No response text received from the model")]
    EmptyResponse,

    /// Text was returned but is not a structured report after fence stripping.
    #[error("Model returned an invalid response: {detail}")]
    InvalidResponse { detail: String },

    /// No provider could be resolved (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Rendering ─────────────────────────────────────────────────────────
    /// The share card could not be composited or encoded.
    #[error("Share card rendering failed: {0}")]
    Render(String),

    // ── Storage ───────────────────────────────────────────────────────────
    /// Reading or writing the key-value store failed.
    #[error("Reminder store error at '{path}': {detail}")]
    Storage { path: PathBuf, detail: String },

    /// Writing an exported artifact failed.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config ────────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LensError {
    /// Text to show the user for this failure.
    ///
    /// Transport failures are inspected for known fragments so that an
    /// oversized upload or a flaky connection gets actionable advice instead
    /// of the generic message.
    pub fn user_message(&self) -> &'static str {
        match self {
            LensError::Capture(e) => e.inline_message(),
            LensError::Timeout { .. } => NETWORK_PAYLOAD_MESSAGE,
            LensError::Transport { message } => {
                if looks_like_network_failure(message) {
                    NETWORK_PAYLOAD_MESSAGE
                } else {
                    GENERIC_FAILURE_MESSAGE
                }
            }
            LensError::EmptyResponse | LensError::InvalidResponse { .. } => {
                INVALID_RESPONSE_MESSAGE
            }
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }

    /// `true` for failures raised by the inference boundary.
    pub fn is_inference_failure(&self) -> bool {
        matches!(
            self,
            LensError::Timeout { .. }
                | LensError::Transport { .. }
                | LensError::EmptyResponse
                | LensError::InvalidResponse { .. }
        )
    }
}

fn looks_like_network_failure(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    NETWORK_HINTS.iter().any(|hint| lower.contains(hint))
}
