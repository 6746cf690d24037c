//! Document-type profiles and geometry validation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::filters::clamp_unit;
use super::types::FormatValidation;

/// Reference area for `size_score` (1200 x 800).
pub const REFERENCE_AREA: f64 = 1200.0 * 800.0;

/// Minimum width x height shared by every built-in profile.
pub const MIN_DIMENSIONS: (u32, u32) = (600, 400);

/// Fallback identifier for undeclared or unrecognized types.
pub const UNKNOWN_DOCUMENT_TYPE: &str = "unknown";

/// Expected geometry for one document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTypeProfile {
    pub document_type: String,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub min_width: u32,
    pub min_height: u32,
    /// Informational; not machine-checked.
    #[serde(default)]
    pub expected_elements: Vec<String>,
}

impl DocumentTypeProfile {
    fn new(
        document_type: &str,
        aspect: (f64, f64),
        min_dims: (u32, u32),
        elements: &[&str],
    ) -> Self {
        Self {
            document_type: document_type.to_string(),
            min_aspect_ratio: aspect.0,
            max_aspect_ratio: aspect.1,
            min_width: min_dims.0,
            min_height: min_dims.1,
            expected_elements: elements.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Built-in profile table.
    pub fn defaults() -> Vec<DocumentTypeProfile> {
        vec![
            Self::new(
                "passport",
                (1.3, 1.5),
                MIN_DIMENSIONS,
                &["photo", "text_regions", "machine_readable_zone"],
            ),
            Self::new(
                "id-card",
                (1.5, 1.7),
                MIN_DIMENSIONS,
                &["photo", "text_regions", "id_number"],
            ),
            Self::new(
                "driver-license",
                (1.5, 1.8),
                MIN_DIMENSIONS,
                &["photo", "license_number", "address"],
            ),
            Self::new(
                "certificate",
                (1.2, 1.4),
                MIN_DIMENSIONS,
                &["title", "name", "date", "signature"],
            ),
        ]
    }
}

/// Canonical form of a declared document type.
///
/// Lower-cases, maps `_` and spaces to `-`, and folds common aliases
/// ("drivers_license", "national id", ...) onto the profile keys.
pub fn normalize_document_type(raw: &str) -> String {
    let key: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == ' ' { '-' } else { c })
        .collect();

    match key.as_str() {
        "" | "other" => UNKNOWN_DOCUMENT_TYPE.to_string(),
        "drivers-license" | "driving-license" | "driver-licence" | "drivers-licence"
        | "license" => "driver-license".to_string(),
        "id" | "idcard" | "identity-card" | "national-id" => "id-card".to_string(),
        _ => key,
    }
}

/// Validate geometry against the declared type's profile.
///
/// Unknown types pass both boolean checks; `size_score` is always computed.
pub fn validate_format(
    width: u32,
    height: u32,
    document_type: &str,
    profiles: &[DocumentTypeProfile],
) -> FormatValidation {
    let size_score = clamp_unit(width as f64 * height as f64 / REFERENCE_AREA);
    let doc_type = normalize_document_type(document_type);

    let Some(profile) = profiles.iter().find(|p| p.document_type == doc_type) else {
        debug!(document_type = %doc_type, "No profile for document type, format accepted");
        return FormatValidation {
            dimensions_valid: true,
            aspect_ratio_valid: true,
            size_score,
        };
    };

    let dimensions_valid = width >= profile.min_width && height >= profile.min_height;
    let aspect_ratio_valid = if height == 0 {
        false
    } else {
        let ratio = width as f64 / height as f64;
        ratio >= profile.min_aspect_ratio && ratio <= profile.max_aspect_ratio
    };

    FormatValidation {
        dimensions_valid,
        aspect_ratio_valid,
        size_score,
    }
}
