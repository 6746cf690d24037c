//! Ancillary feature providers.
//!
//! Low-confidence detectors (EXIF software, photo region, logo and QR
//! shape guessing) live behind one trait so they can be switched on per
//! deployment without touching the core checks. All are off by default.

use std::collections::BTreeMap;
use std::io::Cursor;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::filters::{binarize, is_uniform, otsu_level};
use super::geometry::{external_shapes, Shape};
use super::types::{Anomaly, AnomalyKind};

/// Document types expected to carry a portrait photo.
pub const PHOTO_DOCUMENT_TYPES: [&str; 3] = ["passport", "id-card", "driver-license"];

pub mod limits {
    /// Photo region must cover at least this share of the page.
    pub const PHOTO_MIN_AREA_FRACTION: f64 = 0.015;
    /// Portrait aspect bounds (w/h), inclusive.
    pub const PHOTO_ASPECT_RANGE: (f64, f64) = (0.6, 1.0);

    /// Exclusive contour area bounds for a logo candidate.
    pub const LOGO_AREA_RANGE: (f64, f64) = (500.0, 10_000.0);
    pub const LOGO_MIN_CIRCULARITY: f64 = 0.3;

    /// Exclusive contour area bounds for a QR-like square.
    pub const QR_AREA_RANGE: (f64, f64) = (1_000.0, 50_000.0);
    /// Inclusive aspect bounds for a QR-like square.
    pub const QR_ASPECT_RANGE: (f64, f64) = (0.8, 1.2);
}

/// What a provider may look at.
pub struct ProviderInput<'a> {
    pub gray: &'a GrayImage,
    /// Encoded upload, when the caller still has it. Needed for metadata.
    pub raw_bytes: Option<&'a [u8]>,
    /// Normalized document type.
    pub document_type: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderFindings {
    pub anomalies: Vec<Anomaly>,
    pub features: BTreeMap<String, Value>,
}

/// An optional detector that contributes anomalies and/or named features.
pub trait FeatureProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn inspect(&self, input: &ProviderInput<'_>) -> ProviderFindings;
}

/// Which providers to instantiate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureProviderToggles {
    pub exif_metadata: bool,
    pub photo_region: bool,
    pub logo_candidates: bool,
    pub qr_pattern: bool,
}

/// Build the enabled providers in their fixed order.
pub fn build_providers(
    toggles: &FeatureProviderToggles,
    editing_software: &[String],
) -> Vec<Box<dyn FeatureProvider>> {
    let mut providers: Vec<Box<dyn FeatureProvider>> = Vec::new();
    if toggles.exif_metadata {
        providers.push(Box::new(ExifMetadataProvider::new(editing_software.to_vec())));
    }
    if toggles.photo_region {
        providers.push(Box::new(PhotoRegionProvider));
    }
    if toggles.logo_candidates {
        providers.push(Box::new(LogoCandidateProvider));
    }
    if toggles.qr_pattern {
        providers.push(Box::new(QrPatternProvider));
    }
    providers
}

/// Run every provider, concatenating anomalies in provider order and
/// merging features.
pub fn run_providers(
    providers: &[Box<dyn FeatureProvider>],
    input: &ProviderInput<'_>,
) -> ProviderFindings {
    let mut merged = ProviderFindings::default();
    for provider in providers {
        let findings = provider.inspect(input);
        debug!(
            provider = provider.name(),
            anomalies = findings.anomalies.len(),
            features = findings.features.len(),
            "Feature provider finished"
        );
        merged.anomalies.extend(findings.anomalies);
        merged.features.extend(findings.features);
    }
    merged
}

/// Outer contours of the ink layer (inverse Otsu). Flat images have none.
fn ink_shapes(gray: &GrayImage) -> Vec<Shape> {
    if is_uniform(gray) {
        return Vec::new();
    }
    external_shapes(&binarize(gray, otsu_level(gray), true))
}

// ═══════════════════════════════════════════════════════════
// EXIF metadata
// ═══════════════════════════════════════════════════════════

pub struct ExifMetadataProvider {
    editing_software: Vec<String>,
}

impl ExifMetadataProvider {
    pub fn new(editing_software: Vec<String>) -> Self {
        Self {
            editing_software: editing_software.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    fn is_editing_software(&self, software: &str) -> bool {
        let lower = software.to_lowercase();
        self.editing_software.iter().any(|k| lower.contains(k.as_str()))
    }
}

impl FeatureProvider for ExifMetadataProvider {
    fn name(&self) -> &'static str {
        "exif_metadata"
    }

    fn inspect(&self, input: &ProviderInput<'_>) -> ProviderFindings {
        let mut findings = ProviderFindings::default();
        let Some(bytes) = input.raw_bytes else {
            return findings;
        };
        let Ok(exif) = exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) else {
            return findings;
        };

        for (key, tag) in [
            ("exif_software", exif::Tag::Software),
            ("exif_make", exif::Tag::Make),
            ("exif_model", exif::Tag::Model),
        ] {
            if let Some(value) = ascii_field(&exif, tag) {
                findings.features.insert(key.to_string(), json!(value));
            }
        }

        if let Some(software) = ascii_field(&exif, exif::Tag::Software) {
            if self.is_editing_software(&software) {
                findings.anomalies.push(Anomaly::from(AnomalyKind::EditingSoftware));
            }
        }
        findings
    }
}

fn ascii_field(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Ascii(parts) => {
            let joined = parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').trim().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════
// Shape guessing
// ═══════════════════════════════════════════════════════════

/// Looks for a portrait-shaped photo block on photo-bearing documents.
pub struct PhotoRegionProvider;

impl FeatureProvider for PhotoRegionProvider {
    fn name(&self) -> &'static str {
        "photo_region"
    }

    fn inspect(&self, input: &ProviderInput<'_>) -> ProviderFindings {
        let mut findings = ProviderFindings::default();
        if !PHOTO_DOCUMENT_TYPES.contains(&input.document_type) {
            return findings;
        }

        let min_area = input.gray.width() as f64
            * input.gray.height() as f64
            * limits::PHOTO_MIN_AREA_FRACTION;
        let (lo, hi) = limits::PHOTO_ASPECT_RANGE;
        let regions = ink_shapes(input.gray)
            .iter()
            .filter(|s| s.area >= min_area && (lo..=hi).contains(&s.aspect_ratio()))
            .count();

        findings.features.insert("photo_regions".to_string(), json!(regions));
        if regions == 0 {
            findings.anomalies.push(Anomaly::from(AnomalyKind::MissingPhotoRegion));
        }
        findings
    }
}

/// Counts compact, roughly round marks such as seals and emblems.
pub struct LogoCandidateProvider;

impl FeatureProvider for LogoCandidateProvider {
    fn name(&self) -> &'static str {
        "logo_candidates"
    }

    fn inspect(&self, input: &ProviderInput<'_>) -> ProviderFindings {
        let (lo, hi) = limits::LOGO_AREA_RANGE;
        let count = ink_shapes(input.gray)
            .iter()
            .filter(|s| {
                s.area > lo && s.area < hi && s.circularity() > limits::LOGO_MIN_CIRCULARITY
            })
            .count();

        let mut findings = ProviderFindings::default();
        findings.features.insert("logo_candidates".to_string(), json!(count));
        findings
    }
}

/// Counts square blocks sized like a printed QR code.
pub struct QrPatternProvider;

impl FeatureProvider for QrPatternProvider {
    fn name(&self) -> &'static str {
        "qr_pattern"
    }

    fn inspect(&self, input: &ProviderInput<'_>) -> ProviderFindings {
        let (lo, hi) = limits::QR_AREA_RANGE;
        let (min_aspect, max_aspect) = limits::QR_ASPECT_RANGE;
        let count = ink_shapes(input.gray)
            .iter()
            .filter(|s| {
                s.area > lo
                    && s.area < hi
                    && (min_aspect..=max_aspect).contains(&s.aspect_ratio())
            })
            .count();

        let mut findings = ProviderFindings::default();
        findings.features.insert("qr_candidates".to_string(), json!(count));
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::document::test_images::{fill_rect, png_bytes, solid_rgb};
    use image::Luma;

    fn page(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([235]))
    }

    fn input<'a>(gray: &'a GrayImage, document_type: &'a str) -> ProviderInput<'a> {
        ProviderInput {
            gray,
            raw_bytes: None,
            document_type,
        }
    }

    fn editing_list() -> Vec<String> {
        ["photoshop", "gimp"].iter().map(|s| s.to_string()).collect()
    }

    /// Minimal little-endian TIFF whose IFD0 holds only a Software tag.
    fn tiff_with_software(software: &str) -> Vec<u8> {
        let mut value = software.as_bytes().to_vec();
        value.push(0);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"II");
        bytes.extend_from_slice(&42u16.to_le_bytes());
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&0x0131u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&26u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&value);
        bytes
    }

    #[test]
    fn nothing_is_built_by_default() {
        assert!(build_providers(&FeatureProviderToggles::default(), &editing_list()).is_empty());
    }

    #[test]
    fn providers_are_built_in_fixed_order() {
        let toggles = FeatureProviderToggles {
            exif_metadata: true,
            photo_region: true,
            logo_candidates: true,
            qr_pattern: true,
        };
        let names: Vec<&str> = build_providers(&toggles, &editing_list())
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, vec!["exif_metadata", "photo_region", "logo_candidates", "qr_pattern"]);
    }

    #[test]
    fn exif_without_metadata_reports_nothing() {
        let gray = page(10, 10);
        let png = png_bytes(&solid_rgb(10, 10, [200, 200, 200]));
        let provider = ExifMetadataProvider::new(editing_list());
        let findings = provider.inspect(&ProviderInput {
            gray: &gray,
            raw_bytes: Some(&png),
            document_type: "passport",
        });
        assert_eq!(findings, ProviderFindings::default());
        assert_eq!(provider.inspect(&input(&gray, "passport")), ProviderFindings::default());
    }

    #[test]
    fn exif_editing_software_is_flagged() {
        let gray = page(10, 10);
        let tiff = tiff_with_software("Adobe Photoshop 2024");
        let provider = ExifMetadataProvider::new(editing_list());
        let findings = provider.inspect(&ProviderInput {
            gray: &gray,
            raw_bytes: Some(&tiff),
            document_type: "unknown",
        });
        assert_eq!(findings.anomalies, vec![Anomaly::from(AnomalyKind::EditingSoftware)]);
        assert_eq!(findings.features["exif_software"], json!("Adobe Photoshop 2024"));
    }

    #[test]
    fn exif_camera_software_is_not_flagged() {
        let gray = page(10, 10);
        let tiff = tiff_with_software("Camera Firmware 1.2");
        let provider = ExifMetadataProvider::new(editing_list());
        let findings = provider.inspect(&ProviderInput {
            gray: &gray,
            raw_bytes: Some(&tiff),
            document_type: "unknown",
        });
        assert!(findings.anomalies.is_empty());
    }

    #[test]
    fn passport_without_photo_is_flagged() {
        let gray = page(600, 400);
        let findings = PhotoRegionProvider.inspect(&input(&gray, "passport"));
        assert_eq!(findings.anomalies, vec![Anomaly::from(AnomalyKind::MissingPhotoRegion)]);
        assert_eq!(findings.features["photo_regions"], json!(0));
    }

    #[test]
    fn passport_with_portrait_block_has_photo() {
        let mut gray = page(600, 400);
        fill_rect(&mut gray, 40, 80, 100, 130, 60);
        let findings = PhotoRegionProvider.inspect(&input(&gray, "passport"));
        assert!(findings.anomalies.is_empty());
        assert_eq!(findings.features["photo_regions"], json!(1));
    }

    #[test]
    fn certificate_is_not_checked_for_photo() {
        let gray = page(600, 400);
        let findings = PhotoRegionProvider.inspect(&input(&gray, "certificate"));
        assert_eq!(findings, ProviderFindings::default());
    }

    #[test]
    fn round_seal_is_a_logo_candidate() {
        let mut gray = page(300, 300);
        for y in 0..300u32 {
            for x in 0..300u32 {
                let (dx, dy) = (x as f64 - 150.0, y as f64 - 150.0);
                if dx * dx + dy * dy <= 30.0 * 30.0 {
                    gray.put_pixel(x, y, Luma([20]));
                }
            }
        }
        let findings = LogoCandidateProvider.inspect(&input(&gray, "certificate"));
        assert_eq!(findings.features["logo_candidates"], json!(1));
        assert!(findings.anomalies.is_empty());
    }

    #[test]
    fn square_block_is_a_qr_candidate() {
        let mut gray = page(400, 300);
        fill_rect(&mut gray, 250, 100, 100, 100, 0);
        let findings = QrPatternProvider.inspect(&input(&gray, "id-card"));
        assert_eq!(findings.features["qr_candidates"], json!(1));
    }

    #[test]
    fn run_providers_merges_in_order() {
        let gray = page(600, 400);
        let providers: Vec<Box<dyn FeatureProvider>> =
            vec![Box::new(PhotoRegionProvider), Box::new(QrPatternProvider)];
        let merged = run_providers(&providers, &input(&gray, "passport"));
        assert_eq!(merged.anomalies.len(), 1);
        assert!(merged.features.contains_key("photo_regions"));
        assert!(merged.features.contains_key("qr_candidates"));
    }
}
