pub mod types;
pub mod document;
pub mod filters;
pub mod geometry;
pub mod quality;
pub mod ocr;
pub mod text;
pub mod signature;
pub mod format;
pub mod anomaly;
pub mod features;
pub mod scoring;
pub mod decision;
pub mod orchestrator;

pub use types::*;
pub use document::*;
pub use quality::*;
pub use ocr::*;
pub use text::*;
pub use signature::*;
pub use format::*;
pub use anomaly::*;
pub use features::*;
pub use scoring::*;
pub use decision::*;
pub use orchestrator::*;

use thiserror::Error;

/// Errors surfaced by the analysis pipeline.
///
/// Only `InvalidImage` and `UnsupportedInput` are request-fatal. OCR errors
/// are absorbed by the text analyzer and turned into a degraded result.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("OCR timed out after {0} ms")]
    OcrTimeout(u64),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

impl AnalysisError {
    /// True for errors the caller must report as a bad request rather than a verdict.
    pub fn is_request_fatal(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidImage(_) | AnalysisError::UnsupportedInput(_)
        )
    }
}
