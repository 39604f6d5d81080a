//! Share-card compositing: photo + gradient + text → PNG.
//!
//! All overlay geometry scales with the *baseline unit*, the shorter side
//! of the photo, so a 480 px selfie and a 4000 px DSLR shot get the same
//! proportions. Layers are painted in a fixed order on a fresh surface:
//!
//! 1. the photo at native resolution
//! 2. a dark vertical gradient over the bottom 55 % (legibility on any photo)
//! 3. branding text, bottom-right
//! 4. the display value, bottom-left, coloured by provenance
//! 5. the "Estimated …" / "Self-Reported …" label above the value
//! 6. a footnote with the confidence or the user-adjustment notice
//!
//! Geometry is computed separately in [`layout`] so it can be checked
//! without a font. Text needs a TrueType font; when none can be found the
//! text layers are skipped and the card still renders.

use crate::display::Provenance;
use crate::error::LensError;
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Value colour when it mirrors the model's estimate (emerald-400).
pub const AI_VALUE_COLOR: Rgba<u8> = Rgba([0x34, 0xd3, 0x99, 0xff]);
/// Value colour when the user overrode the estimate (amber-400).
pub const OVERRIDE_VALUE_COLOR: Rgba<u8> = Rgba([0xfb, 0xbf, 0x24, 0xff]);
/// slate-300
pub const LABEL_COLOR: Rgba<u8> = Rgba([0xcb, 0xd5, 0xe1, 0xff]);
/// slate-400
pub const FOOTNOTE_COLOR: Rgba<u8> = Rgba([0x94, 0xa3, 0xb8, 0xff]);
/// slate-200
pub const BRAND_COLOR: Rgba<u8> = Rgba([0xe2, 0xe8, 0xf0, 0xff]);

/// Overlay colour (slate-950) and its opacity stops, top to bottom.
const GRADIENT_RGB: [u8; 3] = [2, 6, 23];
const GRADIENT_STOPS: [(f32, f32); 3] = [(0.0, 0.0), (0.4, 0.7), (1.0, 0.95)];

pub const AI_LABEL: &str = "Estimated Body Fat";
pub const OVERRIDE_LABEL: &str = "Self-Reported Body Fat";
pub const OVERRIDE_FOOTNOTE: &str = "Adjusted by user";

/// Fonts tried when no font path is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Proportions of the card overlay, as fractions of the baseline unit
/// (or of the height for `gradient`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardStyle {
    pub padding: f32,
    pub gradient: f32,
    pub brand_size: f32,
    pub value_size: f32,
    pub label_size: f32,
    pub footnote_size: f32,
    /// Gap between the bottom padding line and the value baseline.
    pub value_lift: f32,
    /// Gap between the top of the value and the label baseline.
    pub label_gap: f32,
}

impl Default for CardStyle {
    fn default() -> Self {
        Self {
            padding: 0.06,
            gradient: 0.55,
            brand_size: 0.04,
            value_size: 0.13,
            label_size: 0.035,
            footnote_size: 0.03,
            value_lift: 0.06,
            label_gap: 0.01,
        }
    }
}

/// What goes on the card, apart from the photo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardContent {
    pub value: String,
    pub provenance: Provenance,
    /// Confidence label from the report; shown only for model values.
    pub confidence: String,
    pub brand: String,
}

impl CardContent {
    pub fn label(&self) -> &'static str {
        match self.provenance {
            Provenance::Ai => AI_LABEL,
            Provenance::UserOverride => OVERRIDE_LABEL,
        }
    }

    pub fn footnote(&self) -> String {
        match self.provenance {
            Provenance::Ai => format!("Confidence: {}", self.confidence),
            Provenance::UserOverride => OVERRIDE_FOOTNOTE.to_string(),
        }
    }

    pub fn value_color(&self) -> Rgba<u8> {
        match self.provenance {
            Provenance::Ai => AI_VALUE_COLOR,
            Provenance::UserOverride => OVERRIDE_VALUE_COLOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// One positioned line of text. `x` is the anchor for `align`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub baseline: f32,
    pub size: f32,
    pub color: Rgba<u8>,
    pub align: Align,
}

/// Resolved geometry for one card.
#[derive(Debug, Clone, PartialEq)]
pub struct CardLayout {
    pub width: u32,
    pub height: u32,
    pub baseline_unit: f32,
    pub padding: f32,
    /// First row covered by the gradient.
    pub gradient_top: u32,
    pub brand: TextRun,
    pub value: TextRun,
    pub label: TextRun,
    pub footnote: TextRun,
}

impl CardLayout {
    /// Text runs in paint order.
    pub fn runs(&self) -> [&TextRun; 4] {
        [&self.brand, &self.value, &self.label, &self.footnote]
    }
}

/// Compute the overlay geometry for a `width × height` card.
pub fn layout(width: u32, height: u32, content: &CardContent, style: &CardStyle) -> CardLayout {
    let (w, h) = (width as f32, height as f32);
    let unit = w.min(h);
    let pad = unit * style.padding;
    let bottom = h - pad;

    let value_size = unit * style.value_size;
    let value_baseline = bottom - unit * style.value_lift;
    let label_baseline = value_baseline - value_size - unit * style.label_gap;
    let gradient_top = (h - h * style.gradient).round().max(0.0) as u32;

    CardLayout {
        width,
        height,
        baseline_unit: unit,
        padding: pad,
        gradient_top,
        brand: TextRun {
            text: content.brand.clone(),
            x: w - pad,
            baseline: bottom,
            size: unit * style.brand_size,
            color: BRAND_COLOR,
            align: Align::Right,
        },
        value: TextRun {
            text: content.value.clone(),
            x: pad,
            baseline: value_baseline,
            size: value_size,
            color: content.value_color(),
            align: Align::Left,
        },
        label: TextRun {
            text: content.label().to_string(),
            x: pad,
            baseline: label_baseline,
            size: unit * style.label_size,
            color: LABEL_COLOR,
            align: Align::Left,
        },
        footnote: TextRun {
            text: content.footnote(),
            x: pad,
            baseline: bottom,
            size: unit * style.footnote_size,
            color: FOOTNOTE_COLOR,
            align: Align::Left,
        },
    }
}

/// Gradient opacity at `t` ∈ [0, 1] from the top of the gradient band.
pub fn gradient_alpha(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    for pair in GRADIENT_STOPS.windows(2) {
        let (t0, a0) = pair[0];
        let (t1, a1) = pair[1];
        if t <= t1 {
            return a0 + (a1 - a0) * (t - t0) / (t1 - t0);
        }
    }
    GRADIENT_STOPS[GRADIENT_STOPS.len() - 1].1
}

/// Composite a share card onto a fresh copy of `source`.
pub fn composite(
    source: &RgbaImage,
    content: &CardContent,
    font: Option<&FontArc>,
    style: &CardStyle,
) -> Result<RgbaImage, LensError> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(LensError::Render(format!(
            "cannot draw on a {width}x{height} surface"
        )));
    }

    let mut surface = source.clone();
    let geometry = layout(width, height, content, style);
    paint_gradient(&mut surface, geometry.gradient_top);

    match font {
        Some(font) => {
            for run in geometry.runs() {
                draw_run(&mut surface, font, run);
            }
        }
        None => warn!("No font available; share card rendered without text"),
    }

    debug!(
        "Composited {}x{} card (unit {:.0}px, gradient from row {})",
        width, height, geometry.baseline_unit, geometry.gradient_top
    );
    Ok(surface)
}

fn paint_gradient(surface: &mut RgbaImage, top: u32) {
    let height = surface.height();
    if top >= height {
        return;
    }
    let span = (height - top) as f32;
    for y in top..height {
        let t = ((y - top) as f32 + 0.5) / span;
        let a = gradient_alpha(t);
        for x in 0..surface.width() {
            let px = surface.get_pixel_mut(x, y);
            blend_over(px, GRADIENT_RGB, a);
        }
    }
}

fn blend_over(px: &mut Rgba<u8>, rgb: [u8; 3], alpha: f32) {
    for (channel, &c) in px.0.iter_mut().take(3).zip(rgb.iter()) {
        let v = f32::from(*channel) * (1.0 - alpha) + f32::from(c) * alpha;
        *channel = v.round().clamp(0.0, 255.0) as u8;
    }
    let dst_a = f32::from(px.0[3]) / 255.0;
    let out_a = alpha + dst_a * (1.0 - alpha);
    px.0[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

fn draw_run(surface: &mut RgbaImage, font: &FontArc, run: &TextRun) {
    if run.text.is_empty() || run.size < 1.0 {
        return;
    }
    let scale = PxScale::from(run.size);
    let ascent = font.as_scaled(scale).ascent();
    let x = match run.align {
        Align::Left => run.x,
        Align::Right => run.x - text_size(scale, font, &run.text).0 as f32,
    };
    let y = run.baseline - ascent;
    draw_text_mut(
        surface,
        run.color,
        x.round() as i32,
        y.round() as i32,
        scale,
        font,
        &run.text,
    );
}

/// Encode a composited card losslessly.
pub fn encode_png(card: &RgbaImage) -> Result<Vec<u8>, LensError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(card.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| LensError::Render(e.to_string()))?;
    Ok(buf)
}

/// Load the card font from `path`, falling back to well-known system fonts.
pub fn load_font(path: Option<&Path>) -> Option<FontArc> {
    let configured = path.map(Path::to_path_buf);
    let candidates = configured
        .iter()
        .cloned()
        .chain(SYSTEM_FONTS.iter().map(PathBuf::from));

    for candidate in candidates {
        let Ok(bytes) = std::fs::read(&candidate) else {
            if Some(&candidate) == configured.as_ref() {
                warn!("Font {} could not be read", candidate.display());
            }
            continue;
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                debug!("Using font {}", candidate.display());
                return Some(font);
            }
            Err(e) => warn!("Font {} is not usable: {}", candidate.display(), e),
        }
    }
    None
}
