use serde::Serialize;

use super::scoring::{FeatureVector, ScoringPolicy};

/// Accept/reject outcome with ordered reasons (empty when accepted).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub is_valid: bool,
    pub reasons: Vec<String>,
}

/// Pure acceptance rule: all four conditions must hold.
pub fn decide(confidence: f64, features: &FeatureVector, policy: &ScoringPolicy) -> Verdict {
    let mut reasons = Vec::new();

    if confidence < policy.accept_confidence {
        reasons.push(format!("Low confidence score: {confidence:.2}"));
    }
    if features.critical_count > 0 {
        reasons.push(format!(
            "Critical anomalies detected: {}",
            features.critical_count
        ));
    }
    if features.quality_score < policy.accept_min_quality {
        reasons.push(format!("Poor image quality: {:.2}", features.quality_score));
    }
    if features.anomaly_count > policy.accept_max_anomalies {
        reasons.push(format!("Too many anomalies: {}", features.anomaly_count));
    }

    Verdict {
        is_valid: reasons.is_empty(),
        reasons,
    }
}
