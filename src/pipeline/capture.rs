//! Image acquisition: file, drag-and-drop payload, or live camera frame.
//!
//! Every source ends up as a decoded [`RawImage`]. Inputs that are not
//! images at all are ignored rather than reported: a user dropping a PDF on
//! the capture area should see nothing happen, not an error banner. The
//! caller gets `Ok(None)` for those.

use crate::error::CaptureError;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a photo came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOrigin {
    File,
    Dropped,
    Camera,
}

/// One RGBA frame grabbed from a live video stream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 pixels, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// An image the user picked, dropped or captured.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file on disk; the extension decides whether it is an image.
    File(PathBuf),
    /// A drag-and-drop payload with its declared MIME type, if any.
    Dropped {
        bytes: Vec<u8>,
        mime: Option<String>,
    },
    /// A frame from the camera at the stream's native resolution.
    CameraFrame(Frame),
}

/// A decoded photo, consumed immediately by normalisation.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub image: DynamicImage,
    pub origin: CaptureOrigin,
}

impl RawImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A live video stream that can hand out single frames.
///
/// Implementations wrap whatever camera API the host platform provides.
/// An `Err` means the stream could not be opened or read (permission
/// denied, no device); its text is kept for logs.
pub trait FrameSource {
    fn grab_frame(&mut self) -> Result<Frame, String>;
}

/// Grab a single frame from a live stream.
pub fn capture_frame(source: &mut dyn FrameSource) -> Result<ImageSource, CaptureError> {
    let frame = source
        .grab_frame()
        .map_err(|detail| CaptureError::CameraUnavailable { detail })?;
    debug!("Grabbed camera frame {}x{}", frame.width, frame.height);
    Ok(ImageSource::CameraFrame(frame))
}

/// Decode an image source.
///
/// # Returns
/// - `Ok(Some(raw))`: decoded image
/// - `Ok(None)`: the input is not an image; nothing to do
/// - `Err(CaptureError)`: an image that could not be read or decoded
pub fn acquire(source: ImageSource) -> Result<Option<RawImage>, CaptureError> {
    match source {
        ImageSource::File(path) => acquire_file(&path),
        ImageSource::Dropped { bytes, mime } => acquire_dropped(&bytes, mime.as_deref()),
        ImageSource::CameraFrame(frame) => acquire_frame(frame).map(Some),
    }
}

fn acquire_file(path: &Path) -> Result<Option<RawImage>, CaptureError> {
    let Ok(format) = ImageFormat::from_path(path) else {
        debug!("Ignoring non-image file {}", path.display());
        return Ok(None);
    };

    let bytes = std::fs::read(path).map_err(|source| CaptureError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let image = image::load_from_memory_with_format(&bytes, format).map_err(|e| {
        CaptureError::DecodeFailed {
            detail: format!("{}: {}", path.display(), e),
        }
    })?;

    debug!(
        "Decoded {} → {}x{} px",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(Some(RawImage {
        image,
        origin: CaptureOrigin::File,
    }))
}

fn acquire_dropped(bytes: &[u8], mime: Option<&str>) -> Result<Option<RawImage>, CaptureError> {
    if let Some(mime) = mime {
        if !mime.trim().to_ascii_lowercase().starts_with("image/") {
            debug!("Ignoring dropped payload of type {}", mime);
            return Ok(None);
        }
    }

    let Ok(format) = image::guess_format(bytes) else {
        debug!("Ignoring dropped payload with unrecognised signature");
        return Ok(None);
    };

    let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        CaptureError::DecodeFailed {
            detail: e.to_string(),
        }
    })?;

    Ok(Some(RawImage {
        image,
        origin: CaptureOrigin::Dropped,
    }))
}

fn acquire_frame(frame: Frame) -> Result<RawImage, CaptureError> {
    let Frame {
        width,
        height,
        rgba,
    } = frame;
    if width == 0 || height == 0 {
        return Err(CaptureError::SurfaceUnavailable { width, height });
    }
    let buffer = RgbaImage::from_raw(width, height, rgba)
        .ok_or(CaptureError::SurfaceUnavailable { width, height })?;

    Ok(RawImage {
        image: DynamicImage::ImageRgba8(buffer),
        origin: CaptureOrigin::Camera,
    })
}
