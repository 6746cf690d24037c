use image::RgbImage;

use super::thresholds;
use super::{AnomalyChecks, CheckError};
use crate::pipeline::analysis::filters::{channel_histogram, channel_means, hsv_saturation, mean_std};
use crate::pipeline::analysis::types::{AnomalyKind, ColorChannel};

/// Saturation, per-channel histogram gaps and channel balance.
pub fn check(rgb: &RgbImage, checks: &AnomalyChecks) -> Result<Vec<AnomalyKind>, CheckError> {
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(CheckError::Degenerate("empty image"));
    }

    let mut found = Vec::new();

    if checks.saturation {
        let (mean, std) = mean_std(hsv_saturation(rgb));
        if !(mean.is_finite() && std.is_finite()) {
            return Err(CheckError::NonFinite("saturation statistics"));
        }
        if mean > thresholds::SATURATION_MEAN || std > thresholds::SATURATION_STD {
            found.push(AnomalyKind::UnusualSaturation);
        }
    }

    if checks.histogram_gaps {
        for channel in ColorChannel::ALL {
            let empty = channel_histogram(rgb, channel).iter().filter(|n| **n == 0).count();
            if empty > thresholds::HISTOGRAM_EMPTY_BINS {
                found.push(AnomalyKind::HistogramGaps(channel));
            }
        }
    }

    if checks.channel_balance {
        let [r, g, b] = channel_means(rgb);
        let max_diff = (r - g).abs().max((g - b).abs()).max((r - b).abs());
        if max_diff > thresholds::CHANNEL_MEAN_DIFF {
            found.push(AnomalyKind::ChannelInconsistency);
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::document::test_images::solid_rgb;
    use image::Rgb;

    #[test]
    fn neutral_gray_page_is_clean() {
        let img = solid_rgb(64, 64, [200, 200, 200]);
        assert!(check(&img, &AnomalyChecks::default()).unwrap().is_empty());
    }

    #[test]
    fn saturated_red_is_flagged() {
        let img = solid_rgb(32, 32, [250, 10, 10]);
        let found = check(&img, &AnomalyChecks::default()).unwrap();
        assert_eq!(
            found,
            vec![AnomalyKind::UnusualSaturation, AnomalyKind::ChannelInconsistency]
        );
    }

    #[test]
    fn histogram_gaps_only_when_enabled() {
        let img = solid_rgb(16, 16, [120, 120, 120]);
        assert!(check(&img, &AnomalyChecks::default()).unwrap().is_empty());

        let found = check(&img, &AnomalyChecks::all()).unwrap();
        assert_eq!(
            found,
            vec![
                AnomalyKind::HistogramGaps(ColorChannel::Red),
                AnomalyKind::HistogramGaps(ColorChannel::Green),
                AnomalyKind::HistogramGaps(ColorChannel::Blue),
            ]
        );
    }

    #[test]
    fn full_range_channel_has_no_gaps() {
        let img = RgbImage::from_fn(256, 1, |x, _| Rgb([x as u8, x as u8, x as u8]));
        let checks = AnomalyChecks {
            histogram_gaps: true,
            ..AnomalyChecks::none()
        };
        assert!(check(&img, &checks).unwrap().is_empty());
    }

    #[test]
    fn empty_image_is_an_error() {
        assert!(check(&RgbImage::new(0, 0), &AnomalyChecks::default()).is_err());
    }
}
