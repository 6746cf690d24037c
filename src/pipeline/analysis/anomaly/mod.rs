//! Anomaly detection.
//!
//! Every check is independent and individually toggleable. The detector's
//! only aggregation job is concatenating results in a fixed order:
//!
//! 1. filename keywords
//! 2. low quality
//! 3. OCR text keywords
//! 4. minimum usable size
//! 5. forensics (compression, gradients, repeated blocks, noise)
//! 6. text layout (encoding, digit words, line lengths)
//! 7. color (saturation, histogram gaps, channel balance)
//! 8. texture (LBP uniformity, abrupt transitions)
//! 9. text structure (region alignment, density)
//! 10. ancillary feature providers
//!
//! A check group that cannot complete contributes a single
//! `CheckFailed` diagnostic instead of aborting the request.

pub mod color;
pub mod forensics;
pub mod layout;
pub mod texture;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::document::DocumentImage;
use super::text::{find_keywords, TextAnalysis};
use super::types::{Anomaly, AnomalyKind, CheckGroup, QualityMetrics};

/// Anomaly thresholds.
pub mod thresholds {
    /// Quality score under this is reported as informational.
    pub const LOW_QUALITY: f64 = 0.3;

    /// Minimum usable document size.
    pub const MIN_USABLE_WIDTH: u32 = 400;
    pub const MIN_USABLE_HEIGHT: u32 = 300;

    /// Laplacian variance under this suggests heavy recompression.
    pub const COMPRESSION_LAPLACIAN_VARIANCE: f64 = 50.0;

    /// Sobel magnitude standard deviation over this is irregular.
    pub const GRADIENT_STD: f64 = 80.0;

    pub const BLOCK_SIZE: u32 = 32;
    /// Upper bound on compared block pairs, independent of resolution.
    pub const MAX_BLOCK_PAIRS: usize = 64;
    /// Blocks flatter than this carry no copy-paste evidence.
    pub const MIN_BLOCK_STD: f64 = 12.0;
    pub const BLOCK_SIMILARITY: f64 = 0.95;
    /// Similar pairs must exceed this count.
    pub const MAX_SIMILAR_PAIRS: usize = 5;

    pub const NOISE_REGION: u32 = 64;
    pub const NOISE_CV: f64 = 0.7;

    /// Text-layout checks run only on at least this many characters.
    pub const MIN_TEXT_CHARS: usize = 10;
    pub const MIN_ASCII_RATIO: f64 = 0.8;
    pub const MAX_DIGIT_WORD_RATIO: f64 = 0.7;
    pub const MIN_LINES_FOR_FORMATTING: usize = 2;
    pub const LINE_LENGTH_VARIANCE: f64 = 500.0;

    pub const SATURATION_MEAN: f64 = 200.0;
    pub const SATURATION_STD: f64 = 80.0;
    pub const HISTOGRAM_EMPTY_BINS: usize = 50;
    pub const CHANNEL_MEAN_DIFF: f64 = 80.0;

    pub const LBP_DOMINANT_FRACTION: f64 = 0.6;
    pub const GRADIENT_PERCENTILE: f64 = 95.0;
    pub const HIGH_GRADIENT_FRACTION: f64 = 0.15;

    /// Alignment is judged only above this many text regions.
    pub const MIN_ALIGNMENT_REGIONS: usize = 3;
    /// Population variance of region top edges (px²).
    pub const ALIGNMENT_Y_VARIANCE: f64 = 10_000.0;

    pub const MIN_TEXT_DENSITY: f64 = 0.05;
    pub const MAX_TEXT_DENSITY: f64 = 0.7;
}

/// Why a check group could not produce a result.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Degenerate input: {0}")]
    Degenerate(&'static str),

    #[error("Non-finite statistic: {0}")]
    NonFinite(&'static str),
}

/// Per-check switches. All on by default except histogram gaps, which
/// fires on most synthetic and palette-reduced images.
///
/// Earlier verdict rules always ran the histogram-gap check; set
/// `histogram_gaps: true` to reproduce them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyChecks {
    pub filename: bool,
    pub low_quality: bool,
    pub suspicious_text: bool,
    pub dimensions: bool,
    pub compression: bool,
    pub gradient: bool,
    pub repeated_blocks: bool,
    pub noise: bool,
    pub text_layout: bool,
    pub saturation: bool,
    pub histogram_gaps: bool,
    pub channel_balance: bool,
    pub texture_uniformity: bool,
    pub abrupt_texture: bool,
    pub text_alignment: bool,
    pub text_density: bool,
}

impl Default for AnomalyChecks {
    fn default() -> Self {
        Self {
            histogram_gaps: false,
            ..Self::all()
        }
    }
}

impl AnomalyChecks {
    pub fn all() -> Self {
        Self::uniform(true)
    }

    pub fn none() -> Self {
        Self::uniform(false)
    }

    fn uniform(on: bool) -> Self {
        Self {
            filename: on,
            low_quality: on,
            suspicious_text: on,
            dimensions: on,
            compression: on,
            gradient: on,
            repeated_blocks: on,
            noise: on,
            text_layout: on,
            saturation: on,
            histogram_gaps: on,
            channel_balance: on,
            texture_uniformity: on,
            abrupt_texture: on,
            text_alignment: on,
            text_density: on,
        }
    }

    /// Names of enabled checks, in evaluation order.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        [
            ("filename", self.filename),
            ("low_quality", self.low_quality),
            ("suspicious_text", self.suspicious_text),
            ("dimensions", self.dimensions),
            ("compression", self.compression),
            ("gradient", self.gradient),
            ("repeated_blocks", self.repeated_blocks),
            ("noise", self.noise),
            ("text_layout", self.text_layout),
            ("saturation", self.saturation),
            ("histogram_gaps", self.histogram_gaps),
            ("channel_balance", self.channel_balance),
            ("texture_uniformity", self.texture_uniformity),
            ("abrupt_texture", self.abrupt_texture),
            ("text_alignment", self.text_alignment),
            ("text_density", self.text_density),
        ]
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| name)
        .collect()
    }
}

/// Everything the detector reads. Borrowed from the orchestrator.
pub struct AnomalyInputs<'a> {
    pub image: &'a DocumentImage,
    pub gray: &'a GrayImage,
    pub filename: Option<&'a str>,
    pub quality: &'a QualityMetrics,
    pub text: &'a TextAnalysis,
    /// Findings from ancillary feature providers, already ordered.
    pub ancillary: &'a [Anomaly],
}

/// Runs the enabled checks in their fixed order.
pub struct AnomalyDetector<'c> {
    checks: &'c AnomalyChecks,
    filename_keywords: &'c [String],
}

impl<'c> AnomalyDetector<'c> {
    pub fn new(checks: &'c AnomalyChecks, filename_keywords: &'c [String]) -> Self {
        Self {
            checks,
            filename_keywords,
        }
    }

    pub fn detect(&self, inputs: &AnomalyInputs<'_>) -> Vec<Anomaly> {
        let checks = self.checks;
        let mut kinds: Vec<AnomalyKind> = Vec::new();

        if checks.filename {
            if let Some(name) = inputs.filename {
                if !find_keywords(name, self.filename_keywords).is_empty() {
                    kinds.push(AnomalyKind::SuspiciousFilename);
                }
            }
        }

        if checks.low_quality && inputs.quality.quality_score < thresholds::LOW_QUALITY {
            kinds.push(AnomalyKind::LowImageQuality);
        }

        if checks.suspicious_text && !inputs.text.suspicious_keywords.is_empty() {
            kinds.push(AnomalyKind::SuspiciousText);
        }

        if checks.dimensions
            && (inputs.image.width() < thresholds::MIN_USABLE_WIDTH
                || inputs.image.height() < thresholds::MIN_USABLE_HEIGHT)
        {
            kinds.push(AnomalyKind::DimensionsTooSmall);
        }

        if checks.compression || checks.gradient || checks.repeated_blocks || checks.noise {
            run_group(&mut kinds, CheckGroup::Forensics, || {
                forensics::check(inputs.gray, checks)
            });
        }

        if checks.text_layout {
            kinds.extend(layout::check_text_layout(&inputs.text.layout));
        }

        if checks.saturation || checks.histogram_gaps || checks.channel_balance {
            run_group(&mut kinds, CheckGroup::ColorSpace, || {
                color::check(inputs.image.rgb(), checks)
            });
        }

        if checks.texture_uniformity || checks.abrupt_texture {
            run_group(&mut kinds, CheckGroup::Texture, || {
                texture::check(inputs.gray, checks)
            });
        }

        if checks.text_alignment || checks.text_density {
            run_group(&mut kinds, CheckGroup::TextStructure, || {
                layout::check_text_structure(inputs.gray, checks)
            });
        }

        let mut anomalies: Vec<Anomaly> = kinds.into_iter().map(Anomaly::from).collect();
        anomalies.extend(inputs.ancillary.iter().cloned());

        debug!(
            total = anomalies.len(),
            critical = anomalies.iter().filter(|a| a.is_critical()).count(),
            "Anomaly detection complete"
        );
        anomalies
    }
}

fn run_group<F>(kinds: &mut Vec<AnomalyKind>, group: CheckGroup, check: F)
where
    F: FnOnce() -> Result<Vec<AnomalyKind>, CheckError>,
{
    match check() {
        Ok(found) => kinds.extend(found),
        Err(e) => {
            warn!(?group, error = %e, "Anomaly check group failed");
            kinds.push(AnomalyKind::CheckFailed(group));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::document::test_images::noisy_gray;
    use crate::pipeline::analysis::text::text_layout;
    use crate::pipeline::analysis::types::{OcrResult, OcrStatus, Severity};
    use std::collections::BTreeMap;

    fn text_analysis(text: &str, keywords: &[&str]) -> TextAnalysis {
        TextAnalysis {
            ocr: OcrResult {
                text: text.to_string(),
                tokens: Vec::new(),
                mean_confidence: 90.0,
                status: OcrStatus::Recognized,
            },
            accuracy: 1.0,
            suspicious_keywords: keywords.iter().map(|k| k.to_string()).collect(),
            extracted_data: BTreeMap::new(),
            layout: text_layout(text),
        }
    }

    fn filename_keywords() -> Vec<String> {
        ["fake", "sample", "specimen"].iter().map(|s| s.to_string()).collect()
    }

    fn only(configure: impl FnOnce(&mut AnomalyChecks)) -> AnomalyChecks {
        let mut checks = AnomalyChecks::none();
        configure(&mut checks);
        checks
    }

    fn good_quality() -> QualityMetrics {
        QualityMetrics {
            sharpness: 1.0,
            brightness: 0.8,
            contrast: 0.8,
            quality_score: 0.88,
        }
    }

    #[test]
    fn default_disables_histogram_gaps_only() {
        let checks = AnomalyChecks::default();
        assert!(!checks.histogram_gaps);
        assert_eq!(checks.enabled_names().len(), 15);
        assert!(AnomalyChecks::none().enabled_names().is_empty());
    }

    #[test]
    fn suspicious_filename_and_text_are_critical_and_ordered() {
        let gray = noisy_gray(500, 400, 120, 200, 1);
        let image = DocumentImage::from_gray(&gray);
        let text = text_analysis("SPECIMEN passport", &["specimen"]);
        let checks = only(|c| {
            c.filename = true;
            c.suspicious_text = true;
        });
        let keywords = filename_keywords();
        let detector = AnomalyDetector::new(&checks, &keywords);
        let anomalies = detector.detect(&AnomalyInputs {
            image: &image,
            gray: &gray,
            filename: Some("Sample_Passport.jpg"),
            quality: &good_quality(),
            text: &text,
            ancillary: &[],
        });
        let messages: Vec<&str> = anomalies.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Suspicious filename detected", "Suspicious text content detected"]
        );
        assert!(anomalies.iter().all(|a| a.severity == Severity::Critical));
    }

    #[test]
    fn low_quality_and_small_size_are_non_critical() {
        let gray = noisy_gray(100, 80, 120, 200, 2);
        let image = DocumentImage::from_gray(&gray);
        let text = text_analysis("", &[]);
        let checks = only(|c| {
            c.low_quality = true;
            c.dimensions = true;
        });
        let keywords = filename_keywords();
        let detector = AnomalyDetector::new(&checks, &keywords);
        let quality = QualityMetrics {
            quality_score: 0.1,
            ..QualityMetrics::default()
        };
        let anomalies = detector.detect(&AnomalyInputs {
            image: &image,
            gray: &gray,
            filename: None,
            quality: &quality,
            text: &text,
            ancillary: &[],
        });
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].kind, AnomalyKind::LowImageQuality);
        assert_eq!(anomalies[1].kind, AnomalyKind::DimensionsTooSmall);
        assert!(anomalies.iter().all(|a| !a.is_critical()));
    }

    #[test]
    fn disabled_checks_report_nothing() {
        let gray = GrayImage::new(10, 10);
        let image = DocumentImage::from_gray(&gray);
        let text = text_analysis("fake fake fake", &["fake"]);
        let checks = AnomalyChecks::none();
        let keywords = filename_keywords();
        let detector = AnomalyDetector::new(&checks, &keywords);
        let anomalies = detector.detect(&AnomalyInputs {
            image: &image,
            gray: &gray,
            filename: Some("fake.png"),
            quality: &QualityMetrics::default(),
            text: &text,
            ancillary: &[],
        });
        assert!(anomalies.is_empty());
    }

    #[test]
    fn degenerate_image_yields_diagnostic_not_panic() {
        let gray = GrayImage::new(2, 2);
        let image = DocumentImage::from_gray(&gray);
        let text = text_analysis("", &[]);
        let checks = only(|c| {
            c.compression = true;
            c.texture_uniformity = true;
        });
        let keywords = filename_keywords();
        let detector = AnomalyDetector::new(&checks, &keywords);
        let anomalies = detector.detect(&AnomalyInputs {
            image: &image,
            gray: &gray,
            filename: None,
            quality: &QualityMetrics::default(),
            text: &text,
            ancillary: &[],
        });
        let kinds: Vec<AnomalyKind> = anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnomalyKind::CheckFailed(CheckGroup::Forensics),
                AnomalyKind::CheckFailed(CheckGroup::Texture),
            ]
        );
        assert_eq!(anomalies[0].message, "Digital forensics analysis failed");
    }

    #[test]
    fn ancillary_findings_come_last() {
        let gray = noisy_gray(120, 90, 0, 255, 3);
        let image = DocumentImage::from_gray(&gray);
        let text = text_analysis("", &[]);
        let checks = only(|c| c.dimensions = true);
        let keywords = filename_keywords();
        let detector = AnomalyDetector::new(&checks, &keywords);
        let ancillary = vec![Anomaly::from(AnomalyKind::EditingSoftware)];
        let anomalies = detector.detect(&AnomalyInputs {
            image: &image,
            gray: &gray,
            filename: None,
            quality: &good_quality(),
            text: &text,
            ancillary: &ancillary,
        });
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[1].kind, AnomalyKind::EditingSoftware);
    }

    #[test]
    fn detection_is_deterministic() {
        let gray = noisy_gray(256, 192, 60, 220, 9);
        let image = DocumentImage::from_gray(&gray);
        let text = text_analysis("Name: Jane Doe\n123 456", &[]);
        let checks = AnomalyChecks::all();
        let keywords = filename_keywords();
        let detector = AnomalyDetector::new(&checks, &keywords);
        let inputs = AnomalyInputs {
            image: &image,
            gray: &gray,
            filename: Some("scan.png"),
            quality: &good_quality(),
            text: &text,
            ancillary: &[],
        };
        assert_eq!(detector.detect(&inputs), detector.detect(&inputs));
    }
}
