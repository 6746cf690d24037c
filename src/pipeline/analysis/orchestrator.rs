//! Pipeline orchestrator.
//!
//! Runs the independent stages (quality, text, signature, format, feature
//! providers), feeds their outputs to the anomaly detector, then scores
//! and decides. Stateless across calls: the only shared data is the
//! immutable configuration.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::anomaly::{AnomalyDetector, AnomalyInputs};
use super::decision::decide;
use super::document::DocumentImage;
use super::features::{build_providers, run_providers, FeatureProvider, ProviderInput};
use super::format::{normalize_document_type, validate_format};
use super::ocr::TimeoutOcrEngine;
use super::quality::assess_quality;
use super::scoring::{ConfidenceScorer, FeatureVector, RuleBasedScorer, ScoringPolicy};
use super::signature::detect_signature;
use super::text::TextAnalyzer;
use super::types::{AnalysisReport, AnalysisRequest, OcrEngine};
use super::AnalysisError;
use crate::config::AnalyzerConfig;

pub struct DocumentAnalyzer {
    config: Arc<AnalyzerConfig>,
    text: TextAnalyzer,
    providers: Vec<Box<dyn FeatureProvider>>,
    scorer: RuleBasedScorer,
}

impl DocumentAnalyzer {
    /// Build an analyzer. The engine is bounded by the configured OCR timeout.
    pub fn new(config: Arc<AnalyzerConfig>, engine: Arc<dyn OcrEngine + Send + Sync>) -> Self {
        let bounded: Arc<dyn OcrEngine + Send + Sync> =
            Arc::new(TimeoutOcrEngine::new(engine, config.ocr_timeout()));
        let text = TextAnalyzer::new(bounded).with_language(&config.ocr_language);
        let providers = build_providers(&config.providers, &config.keywords.editing_software);

        Self {
            config,
            text,
            providers,
            scorer: RuleBasedScorer::default(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn policy(&self) -> &ScoringPolicy {
        self.scorer.policy()
    }

    /// Analyze an already decoded image. Never fails.
    pub fn analyze(&self, image: &DocumentImage, request: &AnalysisRequest) -> AnalysisReport {
        self.run(image, request, None)
    }

    /// Decode and analyze. Decoding is the only failure point.
    pub fn analyze_bytes(
        &self,
        bytes: &[u8],
        request: &AnalysisRequest,
    ) -> Result<AnalysisReport, AnalysisError> {
        let image = DocumentImage::decode(bytes)?;
        Ok(self.run(&image, request, Some(bytes)))
    }

    fn run(
        &self,
        image: &DocumentImage,
        request: &AnalysisRequest,
        raw_bytes: Option<&[u8]>,
    ) -> AnalysisReport {
        let started = Instant::now();
        let document_type = normalize_document_type(&request.document_type);
        info!(
            document_type = %document_type,
            width = image.width(),
            height = image.height(),
            "Starting document analysis"
        );

        let gray = image.to_gray();
        let quality = assess_quality(&gray);
        let text = self
            .text
            .analyze(&gray, &document_type, &self.config.keywords.text);
        let signature = detect_signature(&gray, self.config.signature_mode);
        let format = validate_format(
            image.width(),
            image.height(),
            &document_type,
            &self.config.profiles,
        );
        let ancillary = run_providers(
            &self.providers,
            &ProviderInput {
                gray: &gray,
                raw_bytes,
                document_type: &document_type,
            },
        );
        debug!(
            quality = quality.quality_score,
            ocr_accuracy = text.accuracy,
            signature = signature.present,
            dimensions_valid = format.dimensions_valid,
            aspect_ratio_valid = format.aspect_ratio_valid,
            "Stages complete"
        );

        let detector = AnomalyDetector::new(&self.config.checks, &self.config.keywords.filename);
        let anomalies = detector.detect(&AnomalyInputs {
            image,
            gray: &gray,
            filename: request.filename.as_deref(),
            quality: &quality,
            text: &text,
            ancillary: &ancillary.anomalies,
        });

        let features = FeatureVector {
            quality_score: quality.quality_score,
            ocr_accuracy: text.accuracy,
            signature_detected: signature.present,
            format,
            anomaly_count: anomalies.len(),
            critical_count: anomalies.iter().filter(|a| a.is_critical()).count(),
        };
        let confidence = self.scorer.score(&features);
        let verdict = decide(confidence, &features, self.scorer.policy());

        let processing_time = started.elapsed().as_secs_f64();
        info!(
            document_type = %document_type,
            is_valid = verdict.is_valid,
            confidence,
            anomalies = features.anomaly_count,
            critical = features.critical_count,
            processing_time,
            "Document analysis complete"
        );

        AnalysisReport {
            is_valid: verdict.is_valid,
            confidence_score: confidence,
            detected_text: text.ocr.text.trim().to_string(),
            extracted_data: text.extracted_data,
            anomalies,
            processing_time,
            ocr_accuracy: text.accuracy,
            signature_detected: signature.present,
            format_validation: format,
            quality_score: quality.quality_score,
            rejection_reasons: (!verdict.is_valid).then_some(verdict.reasons),
            document_type,
            quality_metrics: quality,
            policy_version: self.scorer.policy().version,
            ancillary_features: ancillary.features,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
