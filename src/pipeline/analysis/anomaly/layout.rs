//! Layout checks on recognized text and on ink-region density.

use image::GrayImage;
use tracing::debug;

use super::thresholds;
use super::{AnomalyChecks, CheckError};
use crate::pipeline::analysis::filters::{binarize, is_uniform, otsu_level, variance};
use crate::pipeline::analysis::geometry::{external_shapes, Shape};
use crate::pipeline::analysis::text::TextLayout;
use crate::pipeline::analysis::types::{AnomalyKind, BoundingBox};

/// Minimum contour area (px²) for a text region.
const MIN_REGION_AREA: f64 = 100.0;
const MIN_REGION_WIDTH: u32 = 20;
const MIN_REGION_HEIGHT: u32 = 10;
/// Exclusive aspect bounds for a text line.
const REGION_ASPECT_RANGE: (f64, f64) = (0.5, 10.0);

/// Encoding, digit-word and line-length checks. Skipped for short text.
pub fn check_text_layout(layout: &TextLayout) -> Vec<AnomalyKind> {
    let mut found = Vec::new();
    if layout.char_count < thresholds::MIN_TEXT_CHARS {
        return found;
    }

    if layout.ascii_ratio < thresholds::MIN_ASCII_RATIO {
        found.push(AnomalyKind::InconsistentEncoding);
    }
    if layout.digit_word_ratio > thresholds::MAX_DIGIT_WORD_RATIO {
        found.push(AnomalyKind::UnusualTextPattern);
    }
    if layout.line_count > thresholds::MIN_LINES_FOR_FORMATTING
        && layout.line_length_variance > thresholds::LINE_LENGTH_VARIANCE
    {
        found.push(AnomalyKind::InconsistentFormatting);
    }
    found
}

/// Region alignment and ink density over the same contour pass.
pub fn check_text_structure(
    gray: &GrayImage,
    checks: &AnomalyChecks,
) -> Result<Vec<AnomalyKind>, CheckError> {
    let regions = text_regions(gray)?;
    let mut found = Vec::new();

    if checks.text_alignment && regions.len() > thresholds::MIN_ALIGNMENT_REGIONS {
        let spread = alignment_variance(&regions);
        debug!(regions = regions.len(), spread, "Text region alignment");
        if spread > thresholds::ALIGNMENT_Y_VARIANCE {
            found.push(AnomalyKind::PoorTextAlignment);
        }
    }

    if checks.text_density {
        let density = density_of(&regions, gray);
        debug!(density, "Text region density");
        if density < thresholds::MIN_TEXT_DENSITY {
            found.push(AnomalyKind::InsufficientText);
        } else if density > thresholds::MAX_TEXT_DENSITY {
            found.push(AnomalyKind::ExcessiveTextDensity);
        }
    }

    Ok(found)
}

/// Bounding boxes of text-like ink regions.
///
/// Ink is separated with an inverse Otsu threshold. A perfectly flat image
/// has no ink and yields no regions.
pub fn text_regions(gray: &GrayImage) -> Result<Vec<BoundingBox>, CheckError> {
    if gray.width() == 0 || gray.height() == 0 {
        return Err(CheckError::Degenerate("empty image"));
    }
    if is_uniform(gray) {
        return Ok(Vec::new());
    }

    let ink = binarize(gray, otsu_level(gray), true);
    Ok(external_shapes(&ink)
        .iter()
        .filter(|s| is_text_region(s))
        .map(|s| s.bounding_box)
        .collect())
}

/// Summed bounding-box area of text regions over image area.
pub fn text_density(gray: &GrayImage) -> Result<f64, CheckError> {
    let regions = text_regions(gray)?;
    Ok(density_of(&regions, gray))
}

/// Population variance of the regions' top edges.
pub fn alignment_variance(regions: &[BoundingBox]) -> f64 {
    let tops: Vec<f64> = regions.iter().map(|r| r.y as f64).collect();
    variance(&tops)
}

fn density_of(regions: &[BoundingBox], gray: &GrayImage) -> f64 {
    let area = gray.width() as u64 * gray.height() as u64;
    let covered: u64 = regions.iter().map(BoundingBox::area).sum();
    covered as f64 / area as f64
}

fn is_text_region(shape: &Shape) -> bool {
    let bbox = &shape.bounding_box;
    let aspect = bbox.aspect_ratio();
    shape.area > MIN_REGION_AREA
        && bbox.width > MIN_REGION_WIDTH
        && bbox.height > MIN_REGION_HEIGHT
        && aspect > REGION_ASPECT_RANGE.0
        && aspect < REGION_ASPECT_RANGE.1
}
