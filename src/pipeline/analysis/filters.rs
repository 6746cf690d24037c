//! Pixel statistics shared by the analyzers.
//!
//! Heavy filters (blur, Sobel, Otsu) come from `imageproc`; simple
//! statistics are computed directly so each check can read raw numbers.

use image::{GrayImage, Luma, RgbImage};

use super::types::ColorChannel;

/// Sigma matching a 3x3 Gaussian kernel.
pub const GAUSSIAN_SIGMA_3X3: f32 = 0.8;

/// Sigma matching a 5x5 Gaussian kernel.
pub const GAUSSIAN_SIGMA_5X5: f32 = 1.1;

// ═══════════════════════════════════════════════════════════
// Scalar helpers
// ═══════════════════════════════════════════════════════════

/// Map NaN/inf to 0.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Clamp to [0,1], mapping non-finite input to 0.
pub fn clamp_unit(value: f64) -> f64 {
    finite_or_zero(value).clamp(0.0, 1.0)
}

/// Population mean and standard deviation. `(0, 0)` for an empty input.
pub fn mean_std<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;
    for v in values {
        sum += v;
        sum_sq += v * v;
        count += 1;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    let (_, std) = mean_std(values.iter().copied());
    std * std
}

/// Linear-interpolated percentile (0-100) of an ascending slice.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

// ═══════════════════════════════════════════════════════════
// Grayscale statistics
// ═══════════════════════════════════════════════════════════

/// Mean and standard deviation of grayscale intensities.
pub fn gray_mean_std(img: &GrayImage) -> (f64, f64) {
    mean_std(img.pixels().map(|p| p.0[0] as f64))
}

/// True when every pixel has the same value. Empty images count as uniform.
pub fn is_uniform(img: &GrayImage) -> bool {
    let mut pixels = img.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p == first),
        None => true,
    }
}

/// Laplacian variance, a sharpness measure.
///
/// Uses a 3x3 Laplacian kernel: `[0,1,0; 1,-4,1; 0,1,0]` over interior
/// pixels. Images smaller than 3x3 have no interior and return 0.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (w, h) = (img.width(), img.height());
    if w < 3 || h < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| img.get_pixel(x, y).0[0] as f64;
    let mut responses = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            responses.push(px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y));
        }
    }

    finite_or_zero(variance(&responses))
}

/// Per-pixel Sobel gradient magnitude, row-major.
pub fn sobel_magnitude(img: &GrayImage) -> Vec<f64> {
    let gx = imageproc::gradients::horizontal_sobel(img);
    let gy = imageproc::gradients::vertical_sobel(img);
    gx.pixels()
        .zip(gy.pixels())
        .map(|(a, b)| {
            let (dx, dy) = (a.0[0] as f64, b.0[0] as f64);
            (dx * dx + dy * dy).sqrt()
        })
        .collect()
}

pub fn gaussian_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(img, sigma)
}

/// Global Otsu threshold level.
pub fn otsu_level(img: &GrayImage) -> u8 {
    imageproc::contrast::otsu_level(img)
}

/// Binary threshold: pixels above `level` become foreground (255).
/// With `inverse`, pixels at or below `level` become foreground instead.
pub fn binarize(img: &GrayImage, level: u8, inverse: bool) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let above = img.get_pixel(x, y).0[0] > level;
        Luma([if above != inverse { 255 } else { 0 }])
    })
}

/// Local binary pattern histogram over interior pixels.
///
/// Neighbors are visited clockwise from the top-left; bit `k` is set when
/// neighbor `k` is greater than or equal to the center.
pub fn lbp_histogram(img: &GrayImage) -> [u64; 256] {
    const OFFSETS: [(i32, i32); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
    ];

    let mut hist = [0u64; 256];
    let (w, h) = (img.width() as i32, img.height() as i32);
    if w < 3 || h < 3 {
        return hist;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = img.get_pixel(x as u32, y as u32).0[0];
            let mut code = 0u8;
            for (k, (dx, dy)) in OFFSETS.iter().enumerate() {
                let n = img.get_pixel((x + dx) as u32, (y + dy) as u32).0[0];
                if n >= center {
                    code |= 1 << k;
                }
            }
            hist[code as usize] += 1;
        }
    }
    hist
}

// ═══════════════════════════════════════════════════════════
// Color statistics
// ═══════════════════════════════════════════════════════════

/// HSV saturation per pixel on a 0-255 scale.
pub fn hsv_saturation(img: &RgbImage) -> Vec<f64> {
    img.pixels()
        .map(|p| {
            let max = p.0.iter().copied().max().unwrap_or(0) as f64;
            let min = p.0.iter().copied().min().unwrap_or(0) as f64;
            if max == 0.0 {
                0.0
            } else {
                (max - min) / max * 255.0
            }
        })
        .collect()
}

pub fn channel_histogram(img: &RgbImage, channel: ColorChannel) -> [u64; 256] {
    let idx = channel.index();
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[p.0[idx] as usize] += 1;
    }
    hist
}

pub fn channel_means(img: &RgbImage) -> [f64; 3] {
    let mut sums = [0u64; 3];
    for p in img.pixels() {
        for (sum, v) in sums.iter_mut().zip(p.0.iter()) {
            *sum += *v as u64;
        }
    }
    let n = (img.width() as u64 * img.height() as u64).max(1) as f64;
    [sums[0] as f64 / n, sums[1] as f64 / n, sums[2] as f64 / n]
}
