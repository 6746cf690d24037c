//! Confidence scoring.
//!
//! One versioned policy table drives both the scorer and the decision
//! engine. Changing any constant means a new policy version.

use serde::Serialize;
use tracing::debug;

use super::filters::clamp_unit;
use super::types::FormatValidation;

/// Versioned constants for scoring and acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringPolicy {
    pub version: &'static str,

    pub quality_weight: f64,
    pub ocr_weight: f64,

    pub dimensions_bonus: f64,
    pub aspect_ratio_bonus: f64,
    pub size_bonus: f64,
    /// `size_score` must exceed this for the size bonus.
    pub size_bonus_threshold: f64,
    pub signature_bonus: f64,

    pub clean_bonus: f64,
    pub single_anomaly_penalty: f64,
    /// Applies for 2..=`few_anomalies_max` anomalies.
    pub few_anomalies_penalty: f64,
    pub few_anomalies_max: usize,
    pub many_anomalies_penalty: f64,

    /// Extra penalty when anomalies coincide with poor quality.
    pub poor_quality_threshold: f64,
    pub poor_quality_penalty: f64,
    /// Extra penalty when more than `poor_ocr_min_anomalies` anomalies
    /// coincide with poor OCR.
    pub poor_ocr_threshold: f64,
    pub poor_ocr_min_anomalies: usize,
    pub poor_ocr_penalty: f64,

    pub accept_confidence: f64,
    pub accept_min_quality: f64,
    pub accept_max_anomalies: usize,
}

/// The strict policy: 0.7 acceptance, at most two anomalies.
pub const STRICT_V4: ScoringPolicy = ScoringPolicy {
    version: "strict-v4",

    quality_weight: 0.3,
    ocr_weight: 0.25,

    dimensions_bonus: 0.15,
    aspect_ratio_bonus: 0.10,
    size_bonus: 0.10,
    size_bonus_threshold: 0.7,
    signature_bonus: 0.10,

    clean_bonus: 0.10,
    single_anomaly_penalty: 0.25,
    few_anomalies_penalty: 0.50,
    few_anomalies_max: 3,
    many_anomalies_penalty: 0.80,

    poor_quality_threshold: 0.5,
    poor_quality_penalty: 0.20,
    poor_ocr_threshold: 0.5,
    poor_ocr_min_anomalies: 2,
    poor_ocr_penalty: 0.30,

    accept_confidence: 0.7,
    accept_min_quality: 0.4,
    accept_max_anomalies: 2,
};

/// Everything the scorer and decision engine read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub quality_score: f64,
    pub ocr_accuracy: f64,
    pub signature_detected: bool,
    pub format: FormatValidation,
    pub anomaly_count: usize,
    pub critical_count: usize,
}

/// Scoring abstraction (allows swapping in a learned model).
pub trait ConfidenceScorer {
    fn policy(&self) -> &ScoringPolicy;

    /// Confidence in [0,1].
    fn score(&self, features: &FeatureVector) -> f64;
}

/// Additive rule table over a `ScoringPolicy`.
#[derive(Debug, Clone, Copy)]
pub struct RuleBasedScorer {
    policy: ScoringPolicy,
}

impl Default for RuleBasedScorer {
    fn default() -> Self {
        Self { policy: STRICT_V4 }
    }
}

impl RuleBasedScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }
}

impl ConfidenceScorer for RuleBasedScorer {
    fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    fn score(&self, f: &FeatureVector) -> f64 {
        let p = &self.policy;
        let quality = clamp_unit(f.quality_score);
        let ocr = clamp_unit(f.ocr_accuracy);

        let mut score = quality * p.quality_weight + ocr * p.ocr_weight;

        if f.format.dimensions_valid {
            score += p.dimensions_bonus;
        }
        if f.format.aspect_ratio_valid {
            score += p.aspect_ratio_bonus;
        }
        if f.format.size_score > p.size_bonus_threshold {
            score += p.size_bonus;
        }
        if f.signature_detected {
            score += p.signature_bonus;
        }

        score += match f.anomaly_count {
            0 => p.clean_bonus,
            1 => -p.single_anomaly_penalty,
            n if n <= p.few_anomalies_max => -p.few_anomalies_penalty,
            _ => -p.many_anomalies_penalty,
        };

        if f.anomaly_count > 0 && quality < p.poor_quality_threshold {
            score -= p.poor_quality_penalty;
        }
        if f.anomaly_count > p.poor_ocr_min_anomalies && ocr < p.poor_ocr_threshold {
            score -= p.poor_ocr_penalty;
        }

        let confidence = clamp_unit(score);
        debug!(
            raw = score,
            confidence,
            anomalies = f.anomaly_count,
            policy = p.version,
            "Confidence scored"
        );
        confidence
    }
}
