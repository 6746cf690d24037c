//! Pixel-level manipulation traces: recompression, gradient irregularity,
//! duplicated blocks and inconsistent sensor noise.

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::thresholds;
use super::{AnomalyChecks, CheckError};
use crate::pipeline::analysis::filters::{
    gaussian_blur, laplacian_variance, mean_std, sobel_magnitude, GAUSSIAN_SIGMA_5X5,
};
use crate::pipeline::analysis::types::AnomalyKind;

/// Fixed base seed so identical inputs sample identical block pairs.
const BLOCK_SAMPLE_SEED: u64 = 0x5EED_D0C5;

pub fn check(gray: &GrayImage, checks: &AnomalyChecks) -> Result<Vec<AnomalyKind>, CheckError> {
    if gray.width() < 3 || gray.height() < 3 {
        return Err(CheckError::Degenerate("image smaller than 3x3"));
    }

    let mut found = Vec::new();

    if checks.compression {
        let lap_var = laplacian_variance(gray);
        debug!(lap_var, "Compression check");
        if lap_var < thresholds::COMPRESSION_LAPLACIAN_VARIANCE {
            found.push(AnomalyKind::CompressionArtifacts);
        }
    }

    if checks.gradient {
        let (_, grad_std) = mean_std(sobel_magnitude(gray));
        if !grad_std.is_finite() {
            return Err(CheckError::NonFinite("gradient std"));
        }
        if grad_std > thresholds::GRADIENT_STD {
            found.push(AnomalyKind::IrregularGradients);
        }
    }

    if checks.repeated_blocks && similar_block_pairs(gray) > thresholds::MAX_SIMILAR_PAIRS {
        found.push(AnomalyKind::RepeatedPatterns);
    }

    if checks.noise {
        let cv = noise_variation(gray);
        if !cv.is_finite() {
            return Err(CheckError::NonFinite("noise coefficient of variation"));
        }
        if cv > thresholds::NOISE_CV {
            found.push(AnomalyKind::InconsistentNoise);
        }
    }

    Ok(found)
}

/// Count sampled block pairs that look copy-pasted.
///
/// At most `MAX_BLOCK_PAIRS` pairs of distinct full blocks are drawn with a
/// seed derived from the image size. Pairs where either block is nearly
/// flat are skipped: blank paper is not evidence of duplication.
pub fn similar_block_pairs(gray: &GrayImage) -> usize {
    let size = thresholds::BLOCK_SIZE;
    let cols = gray.width() / size;
    let rows = gray.height() / size;
    let blocks = (cols * rows) as usize;
    if blocks < 2 {
        return 0;
    }

    let seed = BLOCK_SAMPLE_SEED ^ ((gray.width() as u64) << 32 | gray.height() as u64);
    let mut rng = StdRng::seed_from_u64(seed);

    let block_at = |index: usize| -> Vec<u8> {
        let bx = (index as u32 % cols) * size;
        let by = (index as u32 / cols) * size;
        let mut pixels = Vec::with_capacity((size * size) as usize);
        for y in by..by + size {
            for x in bx..bx + size {
                pixels.push(gray.get_pixel(x, y).0[0]);
            }
        }
        pixels
    };

    let mut similar = 0;
    for _ in 0..thresholds::MAX_BLOCK_PAIRS {
        let a = rng.gen_range(0..blocks);
        let mut b = rng.gen_range(0..blocks - 1);
        if b >= a {
            b += 1;
        }

        let block_a = block_at(a);
        let block_b = block_at(b);
        if is_flat(&block_a) || is_flat(&block_b) {
            continue;
        }
        if block_similarity(&block_a, &block_b) > thresholds::BLOCK_SIMILARITY {
            similar += 1;
        }
    }

    debug!(blocks, similar, "Repeated block sampling");
    similar
}

fn is_flat(block: &[u8]) -> bool {
    let (_, std) = mean_std(block.iter().map(|v| *v as f64));
    std < thresholds::MIN_BLOCK_STD
}

/// `1 - mean|a - b| / 255`.
fn block_similarity(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let diff: u64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (*x as i16 - *y as i16).unsigned_abs() as u64)
        .sum();
    1.0 - diff as f64 / a.len() as f64 / 255.0
}

/// Coefficient of variation of per-region noise variance.
///
/// Noise is the absolute residual after a 5x5-equivalent Gaussian blur.
/// Returns 0 when fewer than two full regions exist or the image carries
/// no noise at all.
pub fn noise_variation(gray: &GrayImage) -> f64 {
    let region = thresholds::NOISE_REGION;
    let cols = gray.width() / region;
    let rows = gray.height() / region;
    if cols * rows < 2 {
        return 0.0;
    }

    let blurred = gaussian_blur(gray, GAUSSIAN_SIGMA_5X5);
    let mut variances = Vec::with_capacity((cols * rows) as usize);
    for ry in 0..rows {
        for rx in 0..cols {
            let (x0, y0) = (rx * region, ry * region);
            let residuals = (y0..y0 + region).flat_map(|y| {
                let blurred = &blurred;
                (x0..x0 + region).map(move |x| {
                    let g = gray.get_pixel(x, y).0[0] as f64;
                    let b = blurred.get_pixel(x, y).0[0] as f64;
                    (g - b).abs()
                })
            });
            let (_, std) = mean_std(residuals);
            variances.push(std * std);
        }
    }

    let (mean, std) = mean_std(variances.iter().copied());
    if mean <= f64::EPSILON {
        return 0.0;
    }
    std / mean
}
