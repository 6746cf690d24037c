//! Signature presence heuristic.
//!
//! This is a coarse presence check, not shape verification: any external
//! ink blob whose area falls in a signature-plausible range counts. Noise
//! blobs and stamps produce false positives, and that is accepted.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::filters::binarize;
use super::geometry::{external_shapes, Shape};

/// Fixed binarization level; ink is everything at or below it.
pub const INK_THRESHOLD: u8 = 127;

/// Exclusive area bounds (px²) for a candidate stroke group.
pub const MIN_AREA: f64 = 100.0;
pub const MAX_AREA: f64 = 10_000.0;

/// Strict-mode shape bounds (inclusive).
pub const STRICT_ASPECT_RANGE: (f64, f64) = (0.5, 4.0);
pub const STRICT_SOLIDITY_RANGE: (f64, f64) = (0.3, 0.8);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMode {
    /// Area only.
    #[default]
    Basic,
    /// Area plus aspect ratio and solidity.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureFinding {
    pub present: bool,
    pub candidates: usize,
}

/// Count contours that could plausibly be a handwritten signature.
pub fn detect_signature(gray: &GrayImage, mode: SignatureMode) -> SignatureFinding {
    let ink = binarize(gray, INK_THRESHOLD, true);
    let candidates = external_shapes(&ink)
        .iter()
        .filter(|s| is_candidate(s, mode))
        .count();

    debug!(?mode, candidates, "Signature candidates counted");

    SignatureFinding {
        present: candidates > 0,
        candidates,
    }
}

fn is_candidate(shape: &Shape, mode: SignatureMode) -> bool {
    if shape.area <= MIN_AREA || shape.area >= MAX_AREA {
        return false;
    }
    match mode {
        SignatureMode::Basic => true,
        SignatureMode::Strict => {
            let aspect = shape.aspect_ratio();
            let solidity = shape.solidity();
            (STRICT_ASPECT_RANGE.0..=STRICT_ASPECT_RANGE.1).contains(&aspect)
                && (STRICT_SOLIDITY_RANGE.0..=STRICT_SOLIDITY_RANGE.1).contains(&solidity)
        }
    }
}
