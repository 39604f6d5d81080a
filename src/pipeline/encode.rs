//! Normalisation: bound the photo's size and re-encode it as JPEG.
//!
//! The result, a [`NormalizedImage`], is the only artefact sent to the
//! model. Phone cameras produce 12+ MP images; uploading those over a mobile
//! connection fails far more often than it helps, so the longest side is
//! capped (1024 px by default) and the pixels are compressed at quality 70.
//!
//! Encoding is deterministic: the same decoded input with the same bound and
//! quality always produces byte-identical output.

use crate::error::CaptureError;
use crate::pipeline::capture::{CaptureOrigin, RawImage};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// MIME type of every normalised payload.
pub const JPEG_MIME: &str = "image/jpeg";

/// A bounded, JPEG-encoded photo ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl NormalizedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mime_type(&self) -> &'static str {
        JPEG_MIME
    }

    /// Content hash identifying this image for share-card caching.
    pub fn identity(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.bytes.hash(&mut hasher);
        hasher.finish()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Wrap the payload for a multimodal chat message.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.to_base64(), JPEG_MIME).with_detail("high")
    }

    /// Decode the JPEG back into pixels (used by the share-card renderer).
    pub fn decode(&self) -> Result<DynamicImage, CaptureError> {
        image::load_from_memory_with_format(&self.bytes, image::ImageFormat::Jpeg).map_err(|e| {
            CaptureError::DecodeFailed {
                detail: e.to_string(),
            }
        })
    }
}

/// Compute the bounded size for a `width × height` image.
///
/// A single scale factor `bound / max(width, height)` is applied to both
/// sides when either exceeds `bound`, rounding to the nearest pixel, so the
/// aspect ratio is kept. Smaller images are returned unchanged.
pub fn bounded_dimensions(width: u32, height: u32, bound: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= bound {
        return (width, height);
    }
    let scale = f64::from(bound) / f64::from(longest);
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w.min(bound), h.min(bound))
}

/// Normalise a decoded photo for upload.
///
/// File and drag-and-drop photos are bounded to `max_dimension`; camera
/// frames keep their native resolution and are only compressed.
pub fn normalize(
    raw: &RawImage,
    max_dimension: u32,
    quality: u8,
) -> Result<NormalizedImage, CaptureError> {
    let (src_w, src_h) = (raw.width(), raw.height());
    if src_w == 0 || src_h == 0 {
        return Err(CaptureError::SurfaceUnavailable {
            width: src_w,
            height: src_h,
        });
    }

    let (width, height) = match raw.origin {
        CaptureOrigin::Camera => (src_w, src_h),
        CaptureOrigin::File | CaptureOrigin::Dropped => {
            bounded_dimensions(src_w, src_h, max_dimension)
        }
    };

    let bytes = if (width, height) == (src_w, src_h) {
        encode_jpeg(&raw.image, quality)?
    } else {
        let resized = raw.image.resize_exact(width, height, FilterType::Lanczos3);
        encode_jpeg(&resized, quality)?
    };

    debug!(
        "Normalised {}x{} → {}x{} px, {} bytes JPEG q{}",
        src_w,
        src_h,
        width,
        height,
        bytes.len(),
        quality
    );

    Ok(NormalizedImage {
        bytes,
        width,
        height,
    })
}

/// Encode pixels as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| CaptureError::EncodeFailed {
            detail: e.to_string(),
        })?;
    Ok(buf)
}
