use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use super::types::{BoundingBox, OcrEngine, OcrResult, OcrStatus, OcrToken};
use super::AnalysisError;

/// Bundled Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    default_lang: String,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// Use the system tessdata location (TESSDATA_PREFIX or the library default).
    pub fn system() -> Self {
        Self {
            default_lang: "eng".to_string(),
        }
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrResult, AnalysisError> {
        self.ocr_image_with_lang(image_bytes, &self.default_lang)
    }

    fn ocr_image_with_lang(
        &self,
        image_bytes: &[u8],
        lang: &str,
    ) -> Result<OcrResult, AnalysisError> {
        let tess = tesseract::Tesseract::new(None, Some(lang))
            .map_err(|e| AnalysisError::OcrInit(format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| AnalysisError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| AnalysisError::OcrProcessing(format!("{e:?}")))?;

        let mean_confidence = tess.mean_text_conf().max(0) as f32;

        // TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
        let tokens = match tess.get_tsv_text(0) {
            Ok(tsv) => parse_tsv_tokens(&tsv),
            Err(_) => text
                .split_whitespace()
                .map(|w| OcrToken {
                    text: w.to_string(),
                    confidence: mean_confidence,
                    bounding_box: None,
                })
                .collect(),
        };

        Ok(OcrResult {
            text,
            tokens,
            mean_confidence,
            status: OcrStatus::Recognized,
        })
    }
}

/// Stand-in used when the crate is built without the `ocr` feature.
/// Every call fails, so reports carry the engine-error accuracy floor.
pub struct UnavailableOcrEngine;

impl OcrEngine for UnavailableOcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrResult, AnalysisError> {
        self.ocr_image_with_lang(image_bytes, "eng")
    }

    fn ocr_image_with_lang(
        &self,
        _image_bytes: &[u8],
        _lang: &str,
    ) -> Result<OcrResult, AnalysisError> {
        Err(AnalysisError::OcrInit(
            "built without the `ocr` feature".into(),
        ))
    }
}

/// The engine the server uses: system Tesseract when compiled in.
pub fn default_engine() -> Arc<dyn OcrEngine + Send + Sync> {
    #[cfg(feature = "ocr")]
    {
        Arc::new(BundledTesseract::system())
    }
    #[cfg(not(feature = "ocr"))]
    {
        Arc::new(UnavailableOcrEngine)
    }
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    /// Per-token confidence, 0-100.
    pub confidence: f32,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            failure: None,
            delay: None,
        }
    }

    /// An engine that always errors, as if the native library were missing.
    pub fn failing(message: &str) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            failure: Some(message.to_string()),
            delay: None,
        }
    }

    /// Sleep before answering (exercises timeouts).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrResult, AnalysisError> {
        self.ocr_image_with_lang(image_bytes, "eng")
    }

    fn ocr_image_with_lang(
        &self,
        _image_bytes: &[u8],
        _lang: &str,
    ) -> Result<OcrResult, AnalysisError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(ref message) = self.failure {
            return Err(AnalysisError::OcrProcessing(message.clone()));
        }

        let tokens = self
            .text
            .split_whitespace()
            .map(|w| OcrToken {
                text: w.to_string(),
                confidence: self.confidence,
                bounding_box: None,
            })
            .collect();

        Ok(OcrResult {
            text: self.text.clone(),
            tokens,
            mean_confidence: self.confidence,
            status: OcrStatus::Recognized,
        })
    }
}

/// Upper bound on concurrently running OCR worker threads.
pub const MAX_OCR_WORKERS: usize = 8;

/// Bounds a slow engine with a wall-clock timeout.
///
/// The inner call runs on a worker thread. On timeout the worker is
/// abandoned (it finishes in the background and its result is dropped) but
/// keeps its slot until the engine call returns. At most `max_workers`
/// threads run at once; a call made while every slot is taken fails
/// immediately, so a hung engine cannot accumulate threads without bound.
pub struct TimeoutOcrEngine {
    inner: Arc<dyn OcrEngine + Send + Sync>,
    timeout: Duration,
    max_workers: usize,
    in_flight: Arc<AtomicUsize>,
}

impl TimeoutOcrEngine {
    pub fn new(inner: Arc<dyn OcrEngine + Send + Sync>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            max_workers: MAX_OCR_WORKERS,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    fn acquire_slot(&self) -> Option<WorkerSlot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_workers).then_some(n + 1)
            })
            .ok()
            .map(|_| WorkerSlot(Arc::clone(&self.in_flight)))
    }
}

/// Released when the engine call returns, whether or not anyone waited.
struct WorkerSlot(Arc<AtomicUsize>);

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl OcrEngine for TimeoutOcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrResult, AnalysisError> {
        self.ocr_image_with_lang(image_bytes, "eng")
    }

    fn ocr_image_with_lang(
        &self,
        image_bytes: &[u8],
        lang: &str,
    ) -> Result<OcrResult, AnalysisError> {
        let slot = self.acquire_slot().ok_or_else(|| {
            tracing::warn!(max_workers = self.max_workers, "All OCR workers busy");
            AnalysisError::OcrProcessing("All OCR workers busy".into())
        })?;

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let bytes = image_bytes.to_vec();
        let lang = lang.to_string();

        std::thread::Builder::new()
            .name("ocr-worker".into())
            .spawn(move || {
                let result = inner.ocr_image_with_lang(&bytes, &lang);
                // Free the slot before the caller can observe the result.
                drop(slot);
                // Receiver may be gone after a timeout; nothing to report then.
                let _ = tx.send(result);
            })
            .map_err(|e| AnalysisError::OcrProcessing(format!("Cannot spawn OCR worker: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "OCR call timed out");
                Err(AnalysisError::OcrTimeout(self.timeout.as_millis() as u64))
            }
            Err(RecvTimeoutError::Disconnected) => Err(AnalysisError::OcrProcessing(
                "OCR worker exited without a result".into(),
            )),
        }
    }
}

/// Parse Tesseract TSV output into word tokens.
/// Level 5 rows are words. Confidence stays on the engine's 0-100 scale;
/// -1 (no confidence assigned) maps to 0.
pub fn parse_tsv_tokens(tsv: &str) -> Vec<OcrToken> {
    let mut results = Vec::new();

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = match fields[0].parse() {
            Ok(l) => l,
            Err(_) => continue,
        };
        if level != 5 {
            continue;
        }

        let conf: f32 = match fields[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        results.push(OcrToken {
            text: word.to_string(),
            confidence: conf.max(0.0),
            bounding_box: parse_bounding_box(fields[6], fields[7], fields[8], fields[9]),
        });
    }

    results
}

/// Returns None if any field fails to parse.
fn parse_bounding_box(left: &str, top: &str, width: &str, height: &str) -> Option<BoundingBox> {
    Some(BoundingBox {
        x: left.parse().ok()?,
        y: top.parse().ok()?,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
    })
}
