use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

use super::AnalysisError;

// ═══════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════

/// Per-request inputs that travel alongside the pixels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Declared document type, e.g. "passport". Unknown types are accepted.
    pub document_type: String,
    /// Original upload filename, when the transport knows it.
    pub filename: Option<String>,
}

impl AnalysisRequest {
    pub fn new(document_type: &str) -> Self {
        Self {
            document_type: document_type.to_string(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }
}

// ═══════════════════════════════════════════════════════════
// OCR
// ═══════════════════════════════════════════════════════════

/// Pixel rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width over height; 0 for a zero-height box.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

/// One recognized token with its engine confidence (0-100).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrToken {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

/// How the OCR call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStatus {
    Recognized,
    EngineError,
    TimedOut,
}

/// Raw OCR result. Empty on failure, never absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub tokens: Vec<OcrToken>,
    /// Mean engine confidence, 0-100.
    pub mean_confidence: f32,
    pub status: OcrStatus,
}

impl OcrResult {
    pub fn failed(status: OcrStatus) -> Self {
        Self {
            text: String::new(),
            tokens: Vec::new(),
            mean_confidence: 0.0,
            status,
        }
    }
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrResult, AnalysisError>;

    fn ocr_image_with_lang(
        &self,
        image_bytes: &[u8],
        lang: &str,
    ) -> Result<OcrResult, AnalysisError>;
}

// ═══════════════════════════════════════════════════════════
// Stage outputs
// ═══════════════════════════════════════════════════════════

/// Sharpness/brightness/contrast sub-scores plus the combined score.
/// Every field is finite and in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub sharpness: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormatValidation {
    pub dimensions_valid: bool,
    pub aspect_ratio_valid: bool,
    pub size_score: f64,
}

// ═══════════════════════════════════════════════════════════
// Anomalies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    NonCritical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorChannel {
    Red,
    Green,
    Blue,
}

impl ColorChannel {
    pub const ALL: [ColorChannel; 3] = [ColorChannel::Red, ColorChannel::Green, ColorChannel::Blue];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorChannel::Red => "red",
            ColorChannel::Green => "green",
            ColorChannel::Blue => "blue",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            ColorChannel::Red => 0,
            ColorChannel::Green => 1,
            ColorChannel::Blue => 2,
        }
    }
}

/// Check groups that can fail as a unit and report a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckGroup {
    Forensics,
    TextLayout,
    ColorSpace,
    Texture,
    TextStructure,
}

/// Closed vocabulary of anomaly kinds. Severity is fixed per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SuspiciousFilename,
    LowImageQuality,
    SuspiciousText,
    DimensionsTooSmall,
    CompressionArtifacts,
    IrregularGradients,
    RepeatedPatterns,
    InconsistentNoise,
    InconsistentEncoding,
    UnusualTextPattern,
    InconsistentFormatting,
    UnusualSaturation,
    HistogramGaps(ColorChannel),
    ChannelInconsistency,
    TextureUniformity,
    AbruptTextureTransitions,
    PoorTextAlignment,
    InsufficientText,
    ExcessiveTextDensity,
    EditingSoftware,
    MissingPhotoRegion,
    CheckFailed(CheckGroup),
}

impl AnomalyKind {
    pub fn severity(&self) -> Severity {
        match self {
            AnomalyKind::SuspiciousFilename
            | AnomalyKind::SuspiciousText
            | AnomalyKind::CompressionArtifacts
            | AnomalyKind::IrregularGradients
            | AnomalyKind::RepeatedPatterns
            | AnomalyKind::InconsistentNoise
            | AnomalyKind::TextureUniformity
            | AnomalyKind::AbruptTextureTransitions => Severity::Critical,
            _ => Severity::NonCritical,
        }
    }

    /// Human-readable message as shown in API responses.
    pub fn message(&self) -> String {
        let text = match self {
            AnomalyKind::SuspiciousFilename => "Suspicious filename detected",
            AnomalyKind::LowImageQuality => "Very low image quality detected",
            AnomalyKind::SuspiciousText => "Suspicious text content detected",
            AnomalyKind::DimensionsTooSmall => "Document dimensions too small",
            AnomalyKind::CompressionArtifacts => "Suspicious compression artifacts detected",
            AnomalyKind::IrregularGradients => {
                "Irregular gradient patterns detected (possible manipulation)"
            }
            AnomalyKind::RepeatedPatterns => {
                "Repeated patterns detected (possible copy-paste manipulation)"
            }
            AnomalyKind::InconsistentNoise => "Inconsistent noise patterns detected",
            AnomalyKind::InconsistentEncoding => "Inconsistent character encoding detected",
            AnomalyKind::UnusualTextPattern => "Unusual text pattern detected",
            AnomalyKind::InconsistentFormatting => "Inconsistent text formatting detected",
            AnomalyKind::UnusualSaturation => "Unusual color saturation detected",
            AnomalyKind::HistogramGaps(channel) => {
                return format!("Histogram gaps detected in {} channel", channel.as_str());
            }
            AnomalyKind::ChannelInconsistency => "Color channel inconsistency detected",
            AnomalyKind::TextureUniformity => "Unnatural texture uniformity detected",
            AnomalyKind::AbruptTextureTransitions => "Abrupt texture transitions detected",
            AnomalyKind::PoorTextAlignment => "Poor text alignment detected",
            AnomalyKind::InsufficientText => "Insufficient text content for document type",
            AnomalyKind::ExcessiveTextDensity => "Excessive text density detected",
            AnomalyKind::EditingSoftware => {
                "Document may have been processed by editing software"
            }
            AnomalyKind::MissingPhotoRegion => "No photo region detected",
            AnomalyKind::CheckFailed(group) => match group {
                CheckGroup::Forensics => "Digital forensics analysis failed",
                CheckGroup::TextLayout => "Font analysis failed",
                CheckGroup::ColorSpace => "Color space analysis failed",
                CheckGroup::Texture => "Texture analysis failed",
                CheckGroup::TextStructure => "Document structure analysis failed",
            },
        };
        text.to_string()
    }
}

/// A single finding. Construct through `Anomaly::from(kind)` so that
/// severity and message always agree with the kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
}

impl From<AnomalyKind> for Anomaly {
    fn from(kind: AnomalyKind) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: kind.message(),
        }
    }
}

impl Anomaly {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

// ═══════════════════════════════════════════════════════════
// Report
// ═══════════════════════════════════════════════════════════

/// Aggregate output of one analysis. Built once, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub is_valid: bool,
    pub confidence_score: f64,
    pub detected_text: String,
    pub extracted_data: BTreeMap<String, serde_json::Value>,
    #[serde(serialize_with = "serialize_anomaly_messages")]
    pub anomalies: Vec<Anomaly>,
    pub processing_time: f64,
    pub ocr_accuracy: f64,
    pub signature_detected: bool,
    pub format_validation: FormatValidation,
    pub quality_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reasons: Option<Vec<String>>,
    pub document_type: String,
    pub quality_metrics: QualityMetrics,
    pub policy_version: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ancillary_features: BTreeMap<String, serde_json::Value>,
    pub timestamp: String,
}

impl AnalysisReport {
    pub fn critical_anomaly_count(&self) -> usize {
        self.anomalies.iter().filter(|a| a.is_critical()).count()
    }

    pub fn anomaly_messages(&self) -> Vec<&str> {
        self.anomalies.iter().map(|a| a.message.as_str()).collect()
    }
}

fn serialize_anomaly_messages<S>(anomalies: &[Anomaly], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(anomalies.iter().map(|a| a.message.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_fixed_per_kind() {
        assert_eq!(AnomalyKind::SuspiciousFilename.severity(), Severity::Critical);
        assert_eq!(AnomalyKind::RepeatedPatterns.severity(), Severity::Critical);
        assert_eq!(AnomalyKind::LowImageQuality.severity(), Severity::NonCritical);
        assert_eq!(
            AnomalyKind::CheckFailed(CheckGroup::Forensics).severity(),
            Severity::NonCritical
        );
    }

    #[test]
    fn anomaly_from_kind_carries_message() {
        let anomaly = Anomaly::from(AnomalyKind::SuspiciousText);
        assert_eq!(anomaly.message, "Suspicious text content detected");
        assert!(anomaly.is_critical());
    }

    #[test]
    fn histogram_gap_message_names_channel() {
        let anomaly = Anomaly::from(AnomalyKind::HistogramGaps(ColorChannel::Green));
        assert_eq!(anomaly.message, "Histogram gaps detected in green channel");
    }

    #[test]
    fn bounding_box_aspect_handles_zero_height() {
        let bbox = BoundingBox { x: 0, y: 0, width: 10, height: 0 };
        assert_eq!(bbox.aspect_ratio(), 0.0);
        assert_eq!(bbox.area(), 0);
    }

    #[test]
    fn ocr_status_serializes_snake_case() {
        let json = serde_json::to_string(&OcrStatus::EngineError).unwrap();
        assert_eq!(json, "\"engine_error\"");
    }
}
