//! Image quality: sharpness, exposure, contrast.

use image::GrayImage;
use tracing::{debug, warn};

use super::filters::{clamp_unit, gray_mean_std, laplacian_variance};
use super::types::QualityMetrics;

/// Quality scoring constants.
pub mod weights {
    /// Laplacian variance that counts as fully sharp.
    pub const SHARPNESS_SCALE: f64 = 1000.0;

    /// Multiplier on normalized standard deviation; std >= 255/4 is full contrast.
    pub const CONTRAST_GAIN: f64 = 4.0;

    pub const SHARPNESS: f64 = 0.4;
    pub const BRIGHTNESS: f64 = 0.3;
    pub const CONTRAST: f64 = 0.3;
}

/// Compute quality metrics from a grayscale view.
///
/// Never fails: an empty buffer or a non-finite statistic yields all-zero
/// metrics.
pub fn assess_quality(gray: &GrayImage) -> QualityMetrics {
    if gray.width() == 0 || gray.height() == 0 {
        warn!("Quality analysis on empty image");
        return QualityMetrics::default();
    }

    let lap_var = laplacian_variance(gray);
    let (mean, std) = gray_mean_std(gray);

    if !lap_var.is_finite() || !mean.is_finite() || !std.is_finite() {
        warn!(lap_var, mean, std, "Non-finite quality statistics");
        return QualityMetrics::default();
    }

    let sharpness = clamp_unit(lap_var / weights::SHARPNESS_SCALE);
    let brightness = clamp_unit(1.0 - 2.0 * (mean / 255.0 - 0.5).abs());
    let contrast = clamp_unit(std / 255.0 * weights::CONTRAST_GAIN);
    let quality_score = clamp_unit(
        weights::SHARPNESS * sharpness
            + weights::BRIGHTNESS * brightness
            + weights::CONTRAST * contrast,
    );

    debug!(lap_var, mean, std, quality_score, "Image quality assessed");

    QualityMetrics {
        sharpness,
        brightness,
        contrast,
        quality_score,
    }
}
