use image::GrayImage;
use tracing::debug;

use super::thresholds;
use super::{AnomalyChecks, CheckError};
use crate::pipeline::analysis::filters::{lbp_histogram, percentile, sobel_magnitude};
use crate::pipeline::analysis::types::AnomalyKind;

/// LBP uniformity and abrupt gradient transitions.
pub fn check(gray: &GrayImage, checks: &AnomalyChecks) -> Result<Vec<AnomalyKind>, CheckError> {
    if gray.width() < 3 || gray.height() < 3 {
        return Err(CheckError::Degenerate("image smaller than 3x3"));
    }

    let mut found = Vec::new();

    if checks.texture_uniformity && dominant_pattern_fraction(gray) > thresholds::LBP_DOMINANT_FRACTION
    {
        found.push(AnomalyKind::TextureUniformity);
    }

    if checks.abrupt_texture {
        let fraction = high_gradient_fraction(gray);
        if !fraction.is_finite() {
            return Err(CheckError::NonFinite("high gradient fraction"));
        }
        if fraction > thresholds::HIGH_GRADIENT_FRACTION {
            found.push(AnomalyKind::AbruptTextureTransitions);
        }
    }

    Ok(found)
}

/// Share of the most common LBP code, relative to the whole image.
pub fn dominant_pattern_fraction(gray: &GrayImage) -> f64 {
    let hist = lbp_histogram(gray);
    let max = hist.iter().copied().max().unwrap_or(0);
    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let fraction = max as f64 / total as f64;
    debug!(fraction, "LBP dominant pattern");
    fraction
}

/// Fraction of pixels whose gradient magnitude exceeds the 95th percentile.
///
/// Strictly greater: ties at the percentile do not count, so a flat image
/// yields 0. By construction the result never exceeds about 0.05, so the
/// `HIGH_GRADIENT_FRACTION` threshold (0.15) is unreachable and the abrupt
/// transition check cannot fire. It is kept for report compatibility and
/// should not be relied on as a detector.
pub fn high_gradient_fraction(gray: &GrayImage) -> f64 {
    let mut magnitudes = sobel_magnitude(gray);
    if magnitudes.is_empty() {
        return 0.0;
    }
    magnitudes.sort_by(|a, b| a.total_cmp(b));
    let cut = percentile(&magnitudes, thresholds::GRADIENT_PERCENTILE);
    let above = magnitudes.iter().filter(|m| **m > cut).count();
    above as f64 / magnitudes.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::document::test_images::noisy_gray;
    use image::Luma;

    #[test]
    fn flat_image_is_unnaturally_uniform() {
        let img = GrayImage::from_pixel(64, 64, Luma([180]));
        assert!(dominant_pattern_fraction(&img) > thresholds::LBP_DOMINANT_FRACTION);
        let found = check(&img, &AnomalyChecks::default()).unwrap();
        assert_eq!(found, vec![AnomalyKind::TextureUniformity]);
    }

    #[test]
    fn random_texture_is_not_uniform() {
        let img = noisy_gray(64, 64, 0, 255, 11);
        // Extremal centers (codes 0 and 255) each take about 1/9
        assert!(dominant_pattern_fraction(&img) < 0.2);
    }

    #[test]
    fn high_gradient_fraction_of_noise_is_about_five_percent() {
        let img = noisy_gray(100, 100, 0, 255, 12);
        let fraction = high_gradient_fraction(&img);
        assert!(fraction <= 0.06, "fraction {fraction}");
        assert!(!check(&img, &AnomalyChecks::default())
            .unwrap()
            .contains(&AnomalyKind::AbruptTextureTransitions));
    }

    #[test]
    fn high_gradient_fraction_is_capped_near_five_percent() {
        let step = GrayImage::from_fn(80, 80, |x, _| Luma([if x < 40 { 0 } else { 255 }]));
        let checker = GrayImage::from_fn(80, 80, |x, y| {
            Luma([if (x / 4 + y / 4) % 2 == 0 { 0 } else { 255 }])
        });
        let stripes = GrayImage::from_fn(80, 80, |_, y| Luma([if y % 6 < 3 { 30 } else { 220 }]));
        for img in [step, checker, stripes, noisy_gray(80, 80, 0, 255, 5)] {
            let fraction = high_gradient_fraction(&img);
            assert!(fraction <= 0.051, "fraction {fraction}");
            assert!(fraction < thresholds::HIGH_GRADIENT_FRACTION);
        }
    }

    #[test]
    fn flat_image_has_no_high_gradients() {
        let img = GrayImage::from_pixel(20, 20, Luma([0]));
        assert_eq!(high_gradient_fraction(&img), 0.0);
    }

    #[test]
    fn degenerate_image_is_an_error() {
        assert!(check(&GrayImage::new(1, 1), &AnomalyChecks::default()).is_err());
    }
}
