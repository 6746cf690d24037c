//! Text features: OCR invocation, recognition accuracy, suspicious
//! keywords, structured field extraction, and layout statistics.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use image::GrayImage;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::document::encode_gray_png;
use super::filters::{binarize, clamp_unit, gaussian_blur, otsu_level, variance, GAUSSIAN_SIGMA_3X3};
use super::format::normalize_document_type;
use super::types::{OcrEngine, OcrResult, OcrStatus};
use super::AnalysisError;

/// Accuracy reported when the engine itself failed, to distinguish
/// "engine unavailable" from a genuinely blank document.
pub const ENGINE_ERROR_ACCURACY: f64 = 0.1;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Character and line statistics of recognized text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLayout {
    /// Characters in the trimmed text.
    pub char_count: usize,
    pub ascii_ratio: f64,
    /// Fraction of whitespace-separated words made only of digits.
    pub digit_word_ratio: f64,
    /// Raw line count, blank lines included.
    pub line_count: usize,
    /// Variance of non-empty (trimmed) line lengths.
    pub line_length_variance: f64,
}

#[derive(Debug, Clone)]
pub struct TextAnalysis {
    pub ocr: OcrResult,
    pub accuracy: f64,
    /// Keywords from the configured list found in the text, in list order.
    pub suspicious_keywords: Vec<String>,
    pub extracted_data: BTreeMap<String, Value>,
    pub layout: TextLayout,
}

// ═══════════════════════════════════════════════════════════
// Analyzer
// ═══════════════════════════════════════════════════════════

/// Runs OCR through an injected engine and derives text features.
pub struct TextAnalyzer {
    engine: Arc<dyn OcrEngine + Send + Sync>,
    language: String,
}

impl TextAnalyzer {
    pub fn new(engine: Arc<dyn OcrEngine + Send + Sync>) -> Self {
        Self {
            engine,
            language: "eng".to_string(),
        }
    }

    /// Recognition language, e.g. "eng+fra".
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    /// Never fails: engine errors and timeouts degrade to an empty result.
    pub fn analyze(&self, gray: &GrayImage, document_type: &str, keywords: &[String]) -> TextAnalysis {
        let recognized = prepare_for_ocr(gray)
            .and_then(|png| self.engine.ocr_image_with_lang(&png, &self.language));
        let ocr = match recognized {
            Ok(result) => result,
            Err(AnalysisError::OcrTimeout(ms)) => {
                warn!(timeout_ms = ms, "OCR timed out, continuing without text");
                OcrResult::failed(OcrStatus::TimedOut)
            }
            Err(e) => {
                warn!(error = %e, "OCR engine failed, continuing without text");
                OcrResult::failed(OcrStatus::EngineError)
            }
        };

        let accuracy = match ocr.status {
            OcrStatus::Recognized => ocr_accuracy(&ocr.text),
            OcrStatus::EngineError => ENGINE_ERROR_ACCURACY,
            OcrStatus::TimedOut => 0.0,
        };

        let suspicious_keywords = find_keywords(&ocr.text, keywords);
        let extracted_data = extract_structured_data(&ocr.text, document_type);
        let layout = text_layout(&ocr.text);

        debug!(
            chars = layout.char_count,
            accuracy,
            keywords = suspicious_keywords.len(),
            fields = extracted_data.len(),
            "Text analyzed"
        );

        TextAnalysis {
            ocr,
            accuracy,
            suspicious_keywords,
            extracted_data,
            layout,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Pure functions
// ═══════════════════════════════════════════════════════════

/// Denoise and binarize for OCR, then encode as PNG.
pub fn prepare_for_ocr(gray: &GrayImage) -> Result<Vec<u8>, AnalysisError> {
    let blurred = gaussian_blur(gray, GAUSSIAN_SIGMA_3X3);
    let level = otsu_level(&blurred);
    encode_gray_png(&binarize(&blurred, level, false))
}

/// Fraction of alphanumeric or whitespace characters. 0 for blank text.
pub fn ocr_accuracy(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }
    let total = text.chars().count();
    let meaningful = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();
    clamp_unit(meaningful as f64 / total as f64)
}

/// Case-insensitive substring match. Returns matches in list order.
pub fn find_keywords(haystack: &str, keywords: &[String]) -> Vec<String> {
    let lower = haystack.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
        .cloned()
        .collect()
}

pub fn text_layout(text: &str) -> TextLayout {
    let trimmed = text.trim();
    let char_count = trimmed.chars().count();

    let total = text.chars().count();
    let ascii_ratio = if total == 0 {
        1.0
    } else {
        text.chars().filter(|c| c.is_ascii()).count() as f64 / total as f64
    };

    let words: Vec<&str> = text.split_whitespace().collect();
    let digit_word_ratio = if words.is_empty() {
        0.0
    } else {
        let digit_words = words
            .iter()
            .filter(|w| w.chars().all(|c| c.is_ascii_digit()))
            .count();
        digit_words as f64 / words.len() as f64
    };

    let line_lengths: Vec<f64> = text
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.chars().count() as f64)
        .collect();

    TextLayout {
        char_count,
        ascii_ratio,
        digit_word_ratio,
        line_count: text.split('\n').count(),
        line_length_variance: variance(&line_lengths),
    }
}

// ── Structured extraction ──────────────────────────────────

/// A field pattern. Group 1 is the value when present, else the whole match.
struct FieldPattern {
    field: &'static str,
    regex: Regex,
    /// Document types the pattern applies to; empty means all.
    document_types: &'static [&'static str],
    multiple: bool,
}

static FIELD_PATTERNS: LazyLock<Vec<FieldPattern>> = LazyLock::new(|| {
    vec![
        field(
            "passport_number",
            r"\b([A-Z]{1,2}[0-9]{6,9})\b",
            &["passport"],
            false,
        ),
        field(
            "id_number",
            r"\b([0-9]{9,12}|[A-Z]{2,3}[0-9]{6,})\b",
            &["id-card"],
            false,
        ),
        field(
            "license_number",
            r"\b([A-Z]{1,3}[0-9]{5,14})\b",
            &["driver-license"],
            false,
        ),
        field(
            "certificate_number",
            r"(?i)\b(?:certificate\s+)?(?:no\.?|number)\s*[:#]?\s*([A-Z0-9][A-Z0-9-]{3,})",
            &["certificate"],
            false,
        ),
        field(
            "dates",
            r"(?i)\b([0-9]{1,2}[-/.][0-9]{1,2}[-/.][0-9]{4}|[0-9]{4}[-/.][0-9]{1,2}[-/.][0-9]{1,2}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+[0-9]{1,2},?\s+[0-9]{4}|[0-9]{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+[0-9]{4})\b",
            &[],
            true,
        ),
        field(
            "names",
            r"\b([A-Z][a-z]+ [A-Z][a-z]+(?: [A-Z][a-z]+)*)\b",
            &[],
            true,
        ),
        field(
            "emails",
            r"\b([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})\b",
            &[],
            true,
        ),
        field(
            "phone_numbers",
            r"\b([0-9]{3}[-.][0-9]{3}[-.][0-9]{4})\b",
            &[],
            true,
        ),
    ]
});

/// Line-anchored "Label: value" fields.
static LABELLED_FIELDS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("full_name", labelled(r"(?i)^\s*(?:full\s+|given\s+)?name\s*[:\-]\s*(.+?)\s*$")),
        (
            "date_of_birth",
            labelled(r"(?i)^\s*(?:date\s+of\s+birth|dob)\s*[:\-]?\s*(.+?)\s*$"),
        ),
        (
            "document_number",
            labelled(r"(?i)^\s*(?:document|id|passport)\s+(?:number|no\.?)\s*[:\-]?\s*(.+?)\s*$"),
        ),
    ]
});

fn field(
    name: &'static str,
    regex_str: &str,
    document_types: &'static [&'static str],
    multiple: bool,
) -> FieldPattern {
    FieldPattern {
        field: name,
        regex: Regex::new(regex_str).expect("Invalid field regex pattern"),
        document_types,
        multiple,
    }
}

fn labelled(regex_str: &str) -> Regex {
    Regex::new(regex_str).expect("Invalid labelled field regex pattern")
}

/// Extract structured fields. Keys depend on the document type; absent
/// fields are omitted rather than set to null.
pub fn extract_structured_data(text: &str, document_type: &str) -> BTreeMap<String, Value> {
    let doc_type = normalize_document_type(document_type);
    let mut data = BTreeMap::new();
    if text.trim().is_empty() {
        return data;
    }

    for pattern in FIELD_PATTERNS.iter() {
        if !pattern.document_types.is_empty() && !pattern.document_types.contains(&doc_type.as_str()) {
            continue;
        }

        let mut values: Vec<String> = Vec::new();
        for caps in pattern.regex.captures_iter(text) {
            let m = caps.get(1).or_else(|| caps.get(0));
            if let Some(m) = m {
                let value = m.as_str().trim().to_string();
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            if !pattern.multiple && !values.is_empty() {
                break;
            }
        }

        if values.is_empty() {
            continue;
        }
        let value = if pattern.multiple {
            Value::Array(values.into_iter().map(Value::String).collect())
        } else {
            Value::String(values.remove(0))
        };
        data.insert(pattern.field.to_string(), value);
    }

    for line in text.lines() {
        for (name, regex) in LABELLED_FIELDS.iter() {
            if data.contains_key(*name) {
                continue;
            }
            if let Some(value) = regex.captures(line).and_then(|c| c.get(1)) {
                data.insert(name.to_string(), Value::String(value.as_str().to_string()));
            }
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::ocr::MockOcrEngine;
    use std::time::Duration;

    fn keywords() -> Vec<String> {
        ["fake", "sample", "specimen", "not valid"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn accuracy_of_clean_text_is_one() {
        assert_eq!(ocr_accuracy("JOHN SMITH 1985"), 1.0);
    }

    #[test]
    fn accuracy_counts_symbols_against_text() {
        // 4 meaningful of 8
        assert!((ocr_accuracy("ab12#$%&") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn accuracy_of_blank_is_zero() {
        assert_eq!(ocr_accuracy(""), 0.0);
        assert_eq!(ocr_accuracy("   \n "), 0.0);
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let found = find_keywords("THIS IS A SPECIMEN - Not Valid", &keywords());
        assert_eq!(found, vec!["specimen".to_string(), "not valid".to_string()]);
    }

    #[test]
    fn keywords_empty_list_matches_nothing() {
        assert!(find_keywords("fake", &[]).is_empty());
    }

    #[test]
    fn layout_ratios() {
        let layout = text_layout("123 456 789 abc");
        assert_eq!(layout.char_count, 15);
        assert!((layout.digit_word_ratio - 0.75).abs() < 1e-12);
        assert_eq!(layout.ascii_ratio, 1.0);
    }

    #[test]
    fn layout_non_ascii_ratio() {
        let layout = text_layout("ÄÖÜ ab");
        assert!((layout.ascii_ratio - 0.5).abs() < 1e-12);
    }

    #[test]
    fn layout_line_variance_ignores_blank_lines() {
        let layout = text_layout("ab\n\nabcd\n");
        assert_eq!(layout.line_count, 4);
        assert!((layout.line_length_variance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn passport_number_extracted_for_passport_only() {
        let text = "PASSPORT\nSurname SMITH\nP12345678";
        let data = extract_structured_data(text, "passport");
        assert_eq!(data["passport_number"], Value::String("P12345678".into()));

        let other = extract_structured_data(text, "certificate");
        assert!(!other.contains_key("passport_number"));
    }

    #[test]
    fn driver_license_alias_is_normalized() {
        let data = extract_structured_data("DL D1234567", "drivers_license");
        assert_eq!(data["license_number"], Value::String("D1234567".into()));
    }

    #[test]
    fn id_number_digits() {
        let data = extract_structured_data("ID 123456789012", "id-card");
        assert_eq!(data["id_number"], Value::String("123456789012".into()));
    }

    #[test]
    fn dates_and_names_collected() {
        let text = "John Smith born 12/04/1985\nValid from 5 Jan 2020\nJohn Smith";
        let data = extract_structured_data(text, "unknown");
        let dates = data["dates"].as_array().unwrap();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0], "12/04/1985");
        let names = data["names"].as_array().unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0], "John Smith");
    }

    #[test]
    fn labelled_fields_extracted() {
        let text = "Name: Jane Doe\nDOB: 1990-01-01\nDocument Number: X99";
        let data = extract_structured_data(text, "id-card");
        assert_eq!(data["full_name"], Value::String("Jane Doe".into()));
        assert_eq!(data["date_of_birth"], Value::String("1990-01-01".into()));
        assert_eq!(data["document_number"], Value::String("X99".into()));
    }

    #[test]
    fn blank_text_extracts_nothing() {
        assert!(extract_structured_data("  ", "passport").is_empty());
    }

    #[test]
    fn analyzer_uses_engine_text() {
        let analyzer = TextAnalyzer::new(Arc::new(MockOcrEngine::new("SAMPLE passport", 90.0)));
        let gray = GrayImage::from_pixel(20, 20, image::Luma([200]));
        let result = analyzer.analyze(&gray, "passport", &keywords());
        assert_eq!(result.ocr.status, OcrStatus::Recognized);
        assert_eq!(result.accuracy, 1.0);
        assert_eq!(result.suspicious_keywords, vec!["sample".to_string()]);
    }

    #[test]
    fn analyzer_engine_error_uses_floor() {
        let analyzer = TextAnalyzer::new(Arc::new(MockOcrEngine::failing("no engine")));
        let gray = GrayImage::from_pixel(20, 20, image::Luma([200]));
        let result = analyzer.analyze(&gray, "passport", &keywords());
        assert_eq!(result.ocr.status, OcrStatus::EngineError);
        assert_eq!(result.accuracy, ENGINE_ERROR_ACCURACY);
        assert!(result.ocr.text.is_empty());
    }

    #[test]
    fn analyzer_timeout_is_zero_accuracy() {
        let slow = MockOcrEngine::new("late", 90.0).with_delay(Duration::from_millis(400));
        let bounded = crate::pipeline::analysis::ocr::TimeoutOcrEngine::new(
            Arc::new(slow),
            Duration::from_millis(10),
        );
        let analyzer = TextAnalyzer::new(Arc::new(bounded));
        let gray = GrayImage::from_pixel(20, 20, image::Luma([200]));
        let result = analyzer.analyze(&gray, "unknown", &keywords());
        assert_eq!(result.ocr.status, OcrStatus::TimedOut);
        assert_eq!(result.accuracy, 0.0);
        assert!(result.ocr.text.is_empty());
    }

    #[test]
    fn prepared_image_is_png() {
        let gray = GrayImage::from_pixel(30, 10, image::Luma([180]));
        let png = prepare_for_ocr(&gray).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
    }
}
