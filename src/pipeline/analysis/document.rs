//! Decoded document image and its derived views.
//!
//! A `DocumentImage` owns exactly one RGB buffer. Grayscale and HSV
//! representations are computed on demand by the stages that need them.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, GrayImage, Luma, RgbImage};
use tracing::debug;

use super::AnalysisError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial uploads.
pub const MAX_IMAGE_BYTES: usize = 25 * 1024 * 1024;

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
pub const MIN_IMAGE_BYTES: usize = 67;

/// Decoded pixel ceiling. Larger images are rejected before analysis.
const MAX_PIXELS: u64 = 80_000_000;

// ═══════════════════════════════════════════════════════════
// DocumentImage
// ═══════════════════════════════════════════════════════════

/// Owned, immutable document pixels.
#[derive(Debug, Clone)]
pub struct DocumentImage {
    rgb: RgbImage,
    channels: u8,
}

impl DocumentImage {
    /// Wrap an already-decoded RGB buffer.
    pub fn from_rgb(rgb: RgbImage) -> Self {
        Self { rgb, channels: 3 }
    }

    /// Wrap a grayscale buffer (tests, scanners that emit luma only).
    pub fn from_gray(gray: &GrayImage) -> Self {
        let rgb = DynamicImage::ImageLuma8(gray.clone()).to_rgb8();
        Self { rgb, channels: 1 }
    }

    /// Validate, decode, and orient raw upload bytes.
    ///
    /// Every failure here is request-fatal: the bytes are not a usable image.
    pub fn decode(bytes: &[u8]) -> Result<Self, AnalysisError> {
        validate_image_bytes(bytes)?;

        let img = image::load_from_memory(bytes)
            .map_err(|e| AnalysisError::InvalidImage(format!("Failed to decode image: {e}")))?;

        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Err(AnalysisError::InvalidImage("Image has zero dimensions".into()));
        }
        if w as u64 * h as u64 > MAX_PIXELS {
            return Err(AnalysisError::UnsupportedInput(format!(
                "Image too large: {w}x{h} pixels"
            )));
        }

        let channels = img.color().channel_count();
        let orientation = read_exif_orientation(bytes);
        let img = apply_orientation(img, orientation);

        debug!(
            width = w,
            height = h,
            channels,
            orientation,
            "Document image decoded"
        );

        Ok(Self {
            rgb: img.to_rgb8(),
            channels,
        })
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Channel count of the source encoding (1 gray, 2 gray+alpha, 3 RGB, 4 RGBA).
    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// Grayscale view (ITU-R BT.601 luma).
    pub fn to_gray(&self) -> GrayImage {
        rgb_to_gray(&self.rgb)
    }
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

/// Reject byte buffers that cannot possibly be an acceptable upload.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), AnalysisError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(AnalysisError::InvalidImage(format!(
            "Image data too small ({} bytes)",
            bytes.len()
        )));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AnalysisError::UnsupportedInput(format!(
            "Image data too large ({} bytes, max {MAX_IMAGE_BYTES})",
            bytes.len()
        )));
    }
    Ok(())
}

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (x, y, p) in rgb.enumerate_pixels() {
        let luma = 0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32;
        gray.put_pixel(x, y, Luma([luma.round().clamp(0.0, 255.0) as u8]));
    }
    gray
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation so phone photos are analyzed upright.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Encode a grayscale buffer as PNG (OCR engines take encoded bytes).
pub fn encode_gray_png(img: &GrayImage) -> Result<Vec<u8>, AnalysisError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| AnalysisError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}
